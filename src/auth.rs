use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Tenant,
    Owner,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Owner => "owner",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tenant" => Some(Self::Tenant),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// JWT payload issued at login. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
    pub role: UserRole,
}

pub fn issue_token(
    secret: &str,
    user_id: i64,
    email: &str,
    role: UserRole,
    expiry_hours: i64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: (Utc::now() + chrono::Duration::hours(expiry_hours.max(1))).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|error| AppError::Internal(format!("Could not issue token: {error}")))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or missing token.".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolve the authenticated caller from the Authorization header.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Invalid or missing token.".to_string()))?;
    let claims = decode_token(&state.config.jwt_secret, token)?;
    Ok(AuthUser {
        id: claims.sub,
        role: claims.role,
    })
}

pub fn require_tenant(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let user = require_user(state, headers)?;
    if user.role != UserRole::Tenant {
        return Err(AppError::Forbidden(
            "Only tenants can access this endpoint.".to_string(),
        ));
    }
    Ok(user)
}

pub fn require_owner(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let user = require_user(state, headers)?;
    if user.role != UserRole::Owner {
        return Err(AppError::Forbidden(
            "Only owners can access this endpoint.".to_string(),
        ));
    }
    Ok(user)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::Internal(format!("Could not hash password: {error}")))
}

/// Returns Ok(true) on match, Ok(false) on mismatch, Err on a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    use argon2::{Argon2, PasswordVerifier};

    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|error| AppError::Internal(format!("Invalid stored hash: {error}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(error) => Err(AppError::Internal(format!("Verify error: {error}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = issue_token("test-secret", 42, "tenant@example.com", UserRole::Tenant, 1)
            .expect("token issued");
        let claims = decode_token("test-secret", &token).expect("token decodes");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, UserRole::Tenant);
        assert_eq!(claims.email, "tenant@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            issue_token("secret-a", 7, "o@example.com", UserRole::Owner, 1).expect("token issued");
        assert!(decode_token("secret-b", &token).is_err());
    }

    #[test]
    fn correct_password_matches() {
        let hash = hash_password("hunter2").expect("hashing works");
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn role_parsing() {
        assert_eq!(UserRole::parse("Owner"), Some(UserRole::Owner));
        assert_eq!(UserRole::parse(" tenant "), Some(UserRole::Tenant));
        assert_eq!(UserRole::parse("admin"), None);
    }
}
