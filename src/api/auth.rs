//! JWT authentication for the API.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;

/// Configuration for JWT authentication.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Token expiration in seconds
    pub expiration_secs: u64,
    /// Issuer claim
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: "bastion-ops-secret-change-me".to_string(),
            expiration_secs: 3600,
            issuer: "bastion-ops".to_string(),
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// User roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Create new claims for a user.
    pub fn new(subject: impl Into<String>, expiration_secs: u64, issuer: impl Into<String>) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expiration_secs as i64);

        Self {
            sub: subject.into(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: issuer.into(),
            roles: vec!["user".to_string()],
        }
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Check if the user has a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is an admin.
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// JWT authentication handler.
#[derive(Clone)]
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration_secs: u64,
    issuer: String,
}

impl JwtAuth {
    /// Create a new JWT auth handler.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::default();
        validation.set_issuer(&[&config.issuer]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            expiration_secs: config.expiration_secs,
            issuer: config.issuer.clone(),
        }
    }

    pub fn expiration_secs(&self) -> u64 {
        self.expiration_secs
    }

    /// Issue a token for a user with the given roles.
    pub fn generate_token(
        &self,
        subject: impl Into<String>,
        roles: Vec<String>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let mut claims = Claims::new(subject, self.expiration_secs, &self.issuer);
        claims.roles = roles;
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Validate and decode a JWT token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

/// Authenticated user extractor for Axum.
pub struct AuthenticatedUser {
    /// The validated JWT claims
    pub claims: Claims,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)?;

        let claims = state
            .jwt_auth
            .validate_token(token)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;

        if claims.is_expired() {
            return Err(ApiError::Unauthorized("Token has expired".to_string()));
        }

        Ok(AuthenticatedUser { claims })
    }
}

/// Extract the bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized("Authorization header must be Bearer token".to_string())
    })
}

/// Admin-only authentication extractor.
pub struct AdminUser {
    /// The validated JWT claims with admin role
    pub claims: Claims,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.claims.is_admin() {
            return Err(ApiError::Forbidden("Admin privileges required".to_string()));
        }

        Ok(AdminUser {
            claims: user.claims,
        })
    }
}
