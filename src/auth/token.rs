use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;

use crate::{app_error::AppError, config::AuthConfig, models::Role};

/// Claims of a short-lived access token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a refresh token. Carries the subject only, so an access token
/// (which also has a `role`) never decodes as one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Signing material and lifetimes for the HS256 tokens issued by the service.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_expire_minutes),
            Duration::minutes(config.refresh_token_expire_minutes),
        )
    }

    pub fn issue_access_token(&self, username: &str, role: Role) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign access token")
    }

    pub fn issue_refresh_token(&self, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign refresh token")
    }

    pub fn issue_pair(&self, username: &str, role: Role) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(username, role)?,
            refresh_token: self.issue_refresh_token(username)?,
            token_type: "bearer".to_string(),
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.verify(token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        self.verify(token)
    }

    fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, AppError> {
        decode::<C>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!("Rejected token: {}", err);
                AppError::Unauthorized("Token is invalid".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret", Duration::minutes(10), Duration::days(7))
    }

    #[test]
    fn access_token_carries_subject_and_role() {
        let keys = keys();
        let token = keys.issue_access_token("cuddy", Role::Admin).unwrap();
        let claims = keys.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, "cuddy");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn refresh_token_carries_subject_only() {
        let keys = keys();
        let token = keys.issue_refresh_token("wilson").unwrap();
        let claims = keys.verify_refresh_token(&token).unwrap();

        assert_eq!(claims.sub, "wilson");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let keys = keys();
        let refresh = keys.issue_refresh_token("wilson").unwrap();
        assert!(matches!(
            keys.verify_access_token(&refresh),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let keys = keys();
        let access = keys.issue_access_token("wilson", Role::Doctor).unwrap();
        assert!(keys.verify_refresh_token(&access).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("test-secret", Duration::minutes(-5), Duration::days(7));
        let token = keys.issue_access_token("chase", Role::Doctor).unwrap();
        assert!(matches!(
            keys.verify_access_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let other = TokenKeys::new("other-secret", Duration::minutes(10), Duration::days(7));
        let token = other.issue_access_token("foreman", Role::Patient).unwrap();
        assert!(keys().verify_access_token(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(keys().verify_access_token("not.a.jwt").is_err());
        assert!(keys().verify_access_token("").is_err());
    }

    #[test]
    fn pair_uses_bearer_type() {
        let pair = keys().issue_pair("thirteen", Role::Patient).unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_ne!(pair.access_token, pair.refresh_token);
    }
}
