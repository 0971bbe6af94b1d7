use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::config::Config;

/// Marks which half of the session a token belongs to, so an access token
/// can never be replayed as a refresh token or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_use: TokenUse,
}

/// Issues and validates the HS256 token pair. Access and refresh tokens are
/// signed with separate secrets.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        )
    }

    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn refresh_ttl_seconds(&self) -> u64 {
        self.refresh_ttl_seconds
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, TokenUse::Access)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, TokenUse::Refresh)
    }

    fn issue(&self, user_id: Uuid, token_use: TokenUse) -> Result<String, ApiError> {
        let (key, ttl) = match token_use {
            TokenUse::Access => (&self.access_encoding, self.access_ttl_seconds),
            TokenUse::Refresh => (&self.refresh_encoding, self.refresh_ttl_seconds),
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + ttl as i64,
            token_use,
        };
        encode(&Header::default(), &claims, key)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token, TokenUse::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token, TokenUse::Refresh)
    }

    fn verify(&self, token: &str, expected_use: TokenUse) -> Result<Claims, ApiError> {
        let key = match expected_use {
            TokenUse::Access => &self.access_decoding,
            TokenUse::Refresh => &self.refresh_decoding,
        };
        let data = decode::<Claims>(token, key, &Validation::default()).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token expired".to_string())
                }
                _ => ApiError::Unauthorized("Invalid token".to_string()),
            }
        })?;
        if data.claims.token_use != expected_use {
            return Err(ApiError::Unauthorized("Invalid token".to_string()));
        }
        Ok(data.claims)
    }
}
