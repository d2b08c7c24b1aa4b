//! tests/api/helpers.rs
use actix_web::web;
use once_cell::sync::Lazy;
use plinth::auth::BearerToken;
use plinth::configuration::ApplicationSettings;
use plinth::http::JsonResponse;
use plinth::routing;
use plinth::startup;
use plinth::telemetry::{get_subscriber, init_subscriber};

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // Set TEST_LOG=true to see logs during tests
    // Use bunyan to format the logs nicely:
    // $ TEST_LOG=true cargo test | bunyan
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
}

impl TestApp {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_header(
        &self,
        path: &str,
        name: &str,
        value: &str,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}{}", self.address, path))
            .header(name, value)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Greeting {
    pub message: String,
}

async fn greet() -> JsonResponse<Greeting> {
    JsonResponse::new(Greeting {
        message: "hello".into(),
    })
}

async fn whoami(token: BearerToken) -> String {
    token.into_inner()
}

fn test_routes(config: &mut web::ServiceConfig) {
    routing::get(config, "/greeting", greet);
    routing::get(config, "/whoami", whoami);
}

pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let settings = ApplicationSettings {
        host: "127.0.0.1".into(),
        port: 0,
        workers: Some(1),
    };

    let app = startup::build(&settings, test_routes).expect("Failed to build test server.");
    let address = format!("http://127.0.0.1:{}", app.port());

    // Launch the server as a background task
    let _ = tokio::spawn(app.run());

    TestApp { address }
}
