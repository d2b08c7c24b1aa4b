//! tests/api/routing.rs
use crate::helpers::spawn_app;

#[tokio::test]
async fn a_route_answers_without_a_trailing_slash() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get("/greeting").await;

    // Assert
    assert!(response.status().is_success());
}

#[tokio::test]
async fn the_same_route_answers_with_a_trailing_slash() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get("/greeting/").await;

    // Assert
    assert!(response.status().is_success());
}

#[tokio::test]
async fn unregistered_paths_are_still_404() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get("/greetings").await;

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}
