//! src/auth.rs
use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, ResponseError};
use anyhow::Context;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::configuration::AuthSettings;
use crate::http::error_chain_fmt;
use crate::telemetry::spawn_blocking_with_tracing;

// Well-formed hash verified for unknown usernames so response timing does
// not reveal whether an account exists.
const FALLBACK_PASSWORD_HASH: &str = "$argon2id$v=19$m=15000,t=2,p=1$\
        gZiV/M1gPc22ElAH/Jh1Hw$\
        CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

#[derive(thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error("Invalid access token.")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials(_) | AuthError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

/// Hash a password with Argon2id and a freshly generated salt, returning the
/// PHC string to store.
pub fn hash_password(password: &Secret<String>) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());

    let password_hash = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(15000, 2, 1, None).context("Failed to build Argon2 parameters")?,
    )
    .hash_password(password.expose_secret().as_bytes(), &salt)
    .context("Failed to hash password")?
    .to_string();

    Ok(password_hash)
}

#[tracing::instrument(name = "Verify password hash", skip(password, expected_hash))]
pub fn verify_password(password: Secret<String>, expected_hash: String) -> Result<(), AuthError> {
    let expected_hash = argon2::PasswordHash::new(&expected_hash)
        .context("Failed to parse password hash in PHC string format")?;

    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &expected_hash)
        .map_err(|error| AuthError::InvalidCredentials(anyhow::anyhow!(error)))
}

/// `hash_password` on the blocking pool; Argon2 is too slow to run on an
/// executor thread.
pub async fn hash_password_async(password: Secret<String>) -> Result<String, AuthError> {
    spawn_blocking_with_tracing(move || hash_password(&password))
        .await
        .context("Failed to spawn blocking task")?
}

/// `verify_password` on the blocking pool.
pub async fn verify_password_async(
    password: Secret<String>,
    expected_hash: String,
) -> Result<(), AuthError> {
    spawn_blocking_with_tracing(move || verify_password(password, expected_hash))
        .await
        .context("Failed to spawn blocking task")?
}

#[tracing::instrument(name = "Authenticate user", skip(pool, credentials), fields(username = %credentials.username))]
pub async fn authenticate(pool: &PgPool, credentials: Credentials) -> Result<Uuid, AuthError> {
    let stored = get_stored_credentials(pool, &credentials.username)
        .await
        .with_context(|| {
            format!(
                "Failed to retrieve stored credentials for {}",
                credentials.username
            )
        })?;

    let (user_id, password_hash) = match stored {
        Some(user) => (Some(user.user_id), user.password_hash),
        None => (None, FALLBACK_PASSWORD_HASH.to_string()),
    };

    spawn_blocking_with_tracing(move || verify_password(credentials.password, password_hash))
        .await
        .context("Failed to spawn blocking task")??;

    user_id.ok_or_else(|| AuthError::InvalidCredentials(anyhow::anyhow!("Unknown username.")))
}

#[derive(sqlx::FromRow)]
struct StoredCredentials {
    user_id: Uuid,
    password_hash: String,
}

#[tracing::instrument(name = "Get stored credentials", skip(pool))]
async fn get_stored_credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<StoredCredentials>, sqlx::Error> {
    sqlx::query_as::<_, StoredCredentials>(
        "SELECT user_id, password_hash FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Default claim set carried by issued access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Token subject, usually a username or email address.
    pub sub: String,
    /// Expiration time as a Unix timestamp.
    pub exp: i64,
    /// Issue time as a Unix timestamp.
    pub iat: i64,
    /// Unique token id.
    pub jti: Uuid,
}

/// Issues and verifies signed access tokens.
pub struct AuthManager {
    token_secret: Secret<String>,
    token_lifetime: Duration,
    algorithm: Algorithm,
}

impl AuthManager {
    pub fn new(token_secret: Secret<String>, token_lifetime: Duration) -> Self {
        Self {
            token_secret,
            token_lifetime,
            algorithm: Algorithm::HS256,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(
            settings.token_secret.clone(),
            Duration::minutes(settings.token_lifetime_minutes as i64),
        )
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Issue a token for a subject using the default [`Claims`] set.
    #[tracing::instrument(name = "Issue access token", skip(self))]
    pub fn issue_token(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_owned(),
            exp: (now + self.token_lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        self.encode_claims(&claims)
    }

    /// Sign an arbitrary claim set. The claims must carry an `exp` field for
    /// the token to pass decoding later.
    pub fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(
            &Header::new(self.algorithm),
            claims,
            &EncodingKey::from_secret(self.token_secret.expose_secret().as_bytes()),
        )
        .context("Failed to encode access token")
        .map_err(AuthError::UnexpectedError)
    }

    /// Decode and verify a token issued by [`AuthManager::issue_token`].
    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_claims(token)
    }

    /// Decode and verify a token into a caller-provided claim type. Invalid
    /// signatures, malformed tokens, and expired tokens all surface as
    /// [`AuthError::InvalidToken`].
    pub fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        decode::<T>(
            token,
            &DecodingKey::from_secret(self.token_secret.expose_secret().as_bytes()),
            &Validation::new(self.algorithm),
        )
        .map(|data| data.claims)
        .map_err(AuthError::InvalidToken)
    }
}

/// Bearer token taken from the `Authorization` header or, failing that, an
/// `Authorization` cookie. Rejects the request with a 401 when neither
/// carries a `Bearer` credential.
pub struct BearerToken(String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromRequest for BearerToken {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            extract_bearer_token(req)
                .map(BearerToken)
                .ok_or_else(|| AuthError::InvalidCredentials(anyhow::anyhow!("Not authenticated."))),
        )
    }
}

/// The bearer token carried by a request, if any. The header wins when both
/// the header and the cookie are present.
pub fn extract_bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_value);
    if from_header.is_some() {
        return from_header;
    }

    req.cookie("Authorization")
        .and_then(|cookie| bearer_value(cookie.value()))
}

fn bearer_value(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}
