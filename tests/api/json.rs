//! tests/api/json.rs
use crate::helpers::{spawn_app, Greeting};

#[tokio::test]
async fn typed_json_responses_round_trip() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get("/greeting").await;

    // Assert
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("application/json")
    );

    let greeting: Greeting = response.json().await.expect("Failed to parse body");
    assert_eq!(greeting.message, "hello");
}
