//! tests/api/bearer.rs
use crate::helpers::spawn_app;

#[tokio::test]
async fn a_bearer_header_reaches_the_handler() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .get_with_header("/whoami", "Authorization", "Bearer sesame")
        .await;

    // Assert
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "sesame");
}

#[tokio::test]
async fn a_bearer_cookie_reaches_the_handler() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .get_with_header("/whoami", "Cookie", "Authorization=Bearer sesame")
        .await;

    // Assert
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "sesame");
}

#[tokio::test]
async fn a_request_without_a_token_is_rejected_with_a_401() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get("/whoami").await;

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn a_non_bearer_scheme_is_rejected_with_a_401() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .get_with_header("/whoami", "Authorization", "Basic dXNlcjpwYXNz")
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}
