//! src/email/mod.rs
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::configuration::EmailSettings;

mod message;
pub use message::{normalize_recipients, EmailBuilder};

#[derive(thiserror::Error, Debug)]
pub enum EmailError {
    #[error("Invalid mailbox address.")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build email message.")]
    Build(#[from] lettre::error::Error),
    #[error("Failed to deliver email message.")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Sends email through an external SMTP server.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl Mailer {
    /// Build a mailer from settings. With `use_starttls` the connection is
    /// upgraded via STARTTLS (the usual port 587 setup); without it the
    /// connection is plaintext, which only makes sense for local relays and
    /// test servers.
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, EmailError> {
        let sender = settings.from_address.parse::<Mailbox>()?;

        let mut builder = if settings.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };
        builder = builder.port(settings.smtp_port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    /// Start building a message from this mailer's sender address.
    pub fn email_builder(&self) -> EmailBuilder {
        EmailBuilder::new(self.sender.clone())
    }

    /// Send one message to every valid recipient. Recipients that do not
    /// survive [`normalize_recipients`] are dropped; when none survive the
    /// send is skipped and reported as success.
    #[tracing::instrument(
        name = "Send email",
        skip(self, body, recipients),
        fields(subject = %subject)
    )]
    pub async fn send<I, S>(
        &self,
        subject: &str,
        body: &str,
        recipients: I,
        html: bool,
    ) -> Result<(), EmailError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recipients = normalize_recipients(recipients);
        if recipients.is_empty() {
            tracing::warn!("No valid recipients, skipping send");
            return Ok(());
        }

        let mut builder = self.email_builder().subject(subject).body(body).html(html);
        for recipient in &recipients {
            if let Ok(mailbox) = recipient.parse::<Mailbox>() {
                builder = builder.to(mailbox);
            }
        }

        let message = builder.build()?;
        self.transport.send(message).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use secrecy::Secret;

    fn settings() -> EmailSettings {
        EmailSettings {
            smtp_host: "smtp.example.org".into(),
            smtp_port: 2525,
            use_starttls: false,
            from_address: "Support <support@example.org>".into(),
            username: Some("smtp-user".into()),
            password: Some(Secret::new("smtp-pass".into())),
        }
    }

    #[tokio::test]
    async fn a_mailer_is_built_from_valid_settings() {
        let mailer = assert_ok!(Mailer::from_settings(&settings()));
        assert_eq!(mailer.sender().email.to_string(), "support@example.org");
    }

    #[test]
    fn a_malformed_sender_address_is_rejected() {
        let mut settings = settings();
        settings.from_address = "not an address".into();
        let result = Mailer::from_settings(&settings);
        assert!(matches!(result, Err(EmailError::Address(_))));
    }
}
