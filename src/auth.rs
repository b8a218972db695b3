use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::User,
    permissions::{PermissionState, ROLE_ADMIN, ROLE_LECTURER, ROLE_STUDENT},
    repository::RepositoryState,
};

const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()";

/// Length of passwords generated for new accounts.
pub const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of both bearer tokens. The role is embedded for clients; the server always
/// re-reads the user on each request and never trusts `role` for authorization.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    pub role_id: Uuid,
    pub role: String,
    pub token_type: TokenType,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
}

/// issue_token
///
/// Signs an HS256 token of the given type. Returns the token and its lifetime in seconds.
pub fn issue_token(
    config: &AppConfig,
    user: &User,
    role: &str,
    token_type: TokenType,
) -> AppResult<(String, i64)> {
    let hours = match token_type {
        TokenType::Access => config.jwt_expiry_hours,
        TokenType::Refresh => config.refresh_expiry_hours,
    };
    let now = Utc::now();
    let lifetime = Duration::hours(hours);
    let claims = Claims {
        sub: user.id,
        role_id: user.role_id,
        role: role.to_string(),
        token_type,
        iat: now.timestamp() as usize,
        exp: (now + lifetime).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok((token, lifetime.num_seconds()))
}

/// decode_token
///
/// Verifies signature and expiry, then rejects a token of the wrong type with 401.
pub fn decode_token(config: &AppConfig, token: &str, expected: TokenType) -> AppResult<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    if data.claims.token_type != expected {
        return Err(AppError::unauthorized("invalid token type"));
    }
    Ok(data.claims)
}

/// Hashes a plaintext password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// verify_password
///
/// `Ok(false)` on a mismatch; an unparsable stored hash is an internal error.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// A random password drawn from letters, digits and `!@#$%^&*()`.
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..len)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// AuthUser
///
/// The resolved identity of an authenticated request: the user's id, role id and the
/// role's name from the permission cache.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn is_lecturer(&self) -> bool {
        self.role == ROLE_LECTURER
    }

    pub fn is_student(&self) -> bool {
        self.role == ROLE_STUDENT
    }
}

/// Only active, non-deleted users may act.
fn resolve(user: User, permissions: &PermissionState) -> Result<AuthUser, AppError> {
    if !user.is_active {
        return Err(AppError::unauthorized("account is inactive"));
    }
    let role = permissions.role_name(user.role_id).unwrap_or_default().to_string();
    Ok(AuthUser {
        id: user.id,
        role_id: user.role_id,
        role,
    })
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing user stands
///    in for a token.
/// 2. Bearer extraction and access-token validation.
/// 3. User lookup, so deleted or deactivated accounts lose access immediately.
///
/// Rejection: 401 envelope on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    PermissionState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let permissions = PermissionState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass {
                if let Some(user) = repo.get_user(user_id).await? {
                    return resolve(user, &permissions);
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        let claims = decode_token(&config, token, TokenType::Access)?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

        resolve(user, &permissions)
    }
}
