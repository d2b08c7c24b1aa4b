//! src/email/message.rs
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use validator::validate_email;

use super::EmailError;

/// Builder for outgoing messages. Obtained from [`super::Mailer::email_builder`],
/// which fills in the sender.
pub struct EmailBuilder {
    sender: Mailbox,
    recipients: Vec<Mailbox>,
    subject: String,
    body: String,
    html: bool,
}

impl EmailBuilder {
    pub fn new(sender: Mailbox) -> Self {
        Self {
            sender,
            recipients: Vec::new(),
            subject: String::new(),
            body: String::new(),
            html: false,
        }
    }

    pub fn to(mut self, recipient: Mailbox) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Send the body as `text/html` instead of `text/plain`.
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    pub fn build(self) -> Result<Message, EmailError> {
        let mut builder = Message::builder()
            .from(self.sender)
            .subject(self.subject);

        for recipient in self.recipients {
            builder = builder.to(recipient);
        }

        let content_type = if self.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        Ok(builder.header(content_type).body(self.body)?)
    }
}

/// Split, trim, and validate recipient addresses. Each item may itself be a
/// comma separated list; addresses that fail validation are dropped rather
/// than failing the whole batch.
pub fn normalize_recipients<I, S>(recipients: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    recipients
        .into_iter()
        .flat_map(|item| {
            item.as_ref()
                .split(',')
                .map(|part| part.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|address| !address.is_empty() && validate_email(address))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    #[test]
    fn a_comma_separated_string_is_split_and_trimmed() {
        let recipients = normalize_recipients(["ursula@example.org , gethen@example.org"]);
        assert_eq!(
            recipients,
            vec![
                "ursula@example.org".to_string(),
                "gethen@example.org".to_string()
            ]
        );
    }

    #[test]
    fn invalid_addresses_are_dropped_not_fatal() {
        let recipients =
            normalize_recipients(["ursula@example.org", "not-an-address", "@example.org"]);
        assert_eq!(recipients, vec!["ursula@example.org".to_string()]);
    }

    #[test]
    fn an_empty_input_produces_no_recipients() {
        assert!(normalize_recipients([""]).is_empty());
        assert!(normalize_recipients(Vec::<String>::new()).is_empty());
    }

    #[derive(Debug, Clone)]
    struct ValidEmailFixture(pub String);

    impl quickcheck::Arbitrary for ValidEmailFixture {
        fn arbitrary<G: quickcheck::Gen>(g: &mut G) -> Self {
            let email = SafeEmail().fake_with_rng(g);
            Self(email)
        }
    }

    #[quickcheck_macros::quickcheck]
    fn valid_emails_survive_normalization(valid_email: ValidEmailFixture) -> bool {
        normalize_recipients([valid_email.0.as_str()]).len() == 1
    }

    #[test]
    fn built_messages_carry_the_chosen_content_type() {
        let sender = "Support <support@example.org>".parse::<Mailbox>().unwrap();
        let recipient = "ursula@example.org".parse::<Mailbox>().unwrap();

        let message = assert_ok!(EmailBuilder::new(sender)
            .to(recipient)
            .subject("Hello")
            .body("<p>Hi</p>")
            .html(true)
            .build());

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Content-Type: text/html"));
        assert!(formatted.contains("Subject: Hello"));
    }

    #[test]
    fn plain_text_is_the_default_content_type() {
        let sender = "support@example.org".parse::<Mailbox>().unwrap();
        let recipient = "ursula@example.org".parse::<Mailbox>().unwrap();

        let message = assert_ok!(EmailBuilder::new(sender)
            .to(recipient)
            .subject("Hello")
            .body("Hi")
            .build());

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Content-Type: text/plain"));
    }
}
