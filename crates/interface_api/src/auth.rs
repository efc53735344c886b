//! Authentication and authorization
//!
//! Callers present a bearer JWT whose subject is their user id and whose
//! roles name their expense role. The identity provider issuing these
//! tokens is outside this service; `create_token` exists for tooling and
//! tests.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use core_kernel::UserId;
use domain_expense::{Actor, Role};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User's roles
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// The caller as seen by the domain
    ///
    /// When several roles are present the most privileged one wins.
    pub fn actor(&self) -> Result<Actor, AuthError> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)?;
        let role = self
            .roles
            .iter()
            .filter_map(|r| r.parse::<Role>().ok())
            .max_by_key(|r| privilege(*r))
            .ok_or(AuthError::InvalidToken)?;
        Ok(Actor::new(UserId::from_uuid(id), role))
    }
}

fn privilege(role: Role) -> u8 {
    match role {
        Role::Employee => 0,
        Role::Manager => 1,
        Role::Finance => 2,
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("{0}")]
    MissingRole(String),
}

/// Creates a new JWT token
pub fn create_token(
    user_id: &str,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        roles,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Fails unless the actor holds one of `roles`
pub fn require_role(actor: &Actor, roles: &[Role]) -> Result<(), AuthError> {
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AuthError::MissingRole(format!(
            "This action requires one of the roles: {}",
            names.join(", ")
        )))
    }
}
