//! Authentication for the API.
//!
//! Researchers log in with a username and password and receive a signed
//! token. Every route except login passes through [require_token], which
//! rejects requests without a valid token and otherwise makes the
//! [CurrentResearcher] available to handlers as an extension.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::models::RecordId;
use crate::routes::AppState;
use crate::util::now;

const BCRYPT_COST: u32 = 10;
const BEARER_PREFIX: &str = "Bearer ";

/// The name of the cookie the token is also handed out in.
pub const TOKEN_COOKIE: &str = "access_token";

/// Runs a bcrypt call on the blocking pool, off the request workers.
async fn run_bcrypt<T, F>(action: &'static str, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> bcrypt::BcryptResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::ServerError(format!("Failed to {}: {}", action, err)))?
        .map_err(|err| ApiError::ServerError(format!("Failed to {}: {}", action, err)))
}

pub async fn hash_password(password: &str) -> ApiResult<String> {
    let password = password.to_owned();
    run_bcrypt("hash password", move || bcrypt::hash(password, BCRYPT_COST)).await
}

/// Checks a candidate password against a stored hash.
pub async fn verify_password(candidate: &str, pass_hash: &str) -> ApiResult<bool> {
    let candidate = candidate.to_owned();
    let pass_hash = pass_hash.to_owned();
    run_bcrypt("verify password", move || bcrypt::verify(candidate, &pass_hash)).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The id of the researcher the token was issued to
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and checks login tokens with a single shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, researcher_id: RecordId) -> ApiResult<String> {
        let issued_at = now();
        let claims = Claims {
            sub: researcher_id.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + self.lifetime).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| ApiError::ServerError(format!("Failed to sign token: {}", err)))
    }

    /// The researcher a token was issued to, if it is valid and unexpired.
    pub fn verify(&self, token: &str) -> ApiResult<RecordId> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|err| ApiError::Unauthorized(format!("Token error: {}", err)))?;

        data.claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Token error: malformed subject".to_owned()))
    }
}

/// The researcher making the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentResearcher(pub RecordId);

/// The token in the `Authorization` header, with or without a `Bearer` prefix.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Rejects requests that don't carry a valid token.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = token_from_headers(request.headers()).ok_or_else(|| {
        tracing::warn!(path = %request.uri().path(), "request without a token");
        ApiError::Unauthorized("Logout status, no access".to_owned())
    })?;

    let researcher_id = state.tokens.verify(token).map_err(|err| {
        tracing::warn!(path = %request.uri().path(), "request with an invalid token");
        err
    })?;

    request
        .extensions_mut()
        .insert(CurrentResearcher(researcher_id));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::hours(1))
    }

    #[tokio::test]
    async fn passwords_verify_against_their_hash() {
        let hash = hash_password("hunter2").await.unwrap();

        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash).await.unwrap());
        assert!(!verify_password("hunter3", &hash).await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_leaves_the_runtime_free() {
        let hashing = tokio::spawn(hash_password("hunter2"));
        let other = tokio::spawn(async {});

        other.await.unwrap();
        assert!(!hashing.is_finished());
        assert!(hashing.await.unwrap().is_ok());
    }

    #[test]
    fn issued_tokens_verify() {
        let id = RecordId::new();
        let token = issuer().issue(id).unwrap();

        assert_eq!(issuer().verify(&token).unwrap(), id);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = TokenIssuer::new("other-secret", Duration::hours(1))
            .issue(RecordId::new())
            .unwrap();

        assert!(matches!(
            issuer().verify(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = TokenIssuer::new("test-secret", Duration::hours(-2))
            .issue(RecordId::new())
            .unwrap();

        assert!(matches!(
            issuer().verify(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn tokens_are_read_with_or_without_a_bearer_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(token_from_headers(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(token_from_headers(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(token_from_headers(&headers), Some("abc"));
    }
}
