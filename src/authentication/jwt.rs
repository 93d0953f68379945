use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::constants::SESSION_TTL_HOURS;
use crate::database::schema::{User, UserRole};
use crate::error::ApiError;

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: i32, username: String, role: UserRole) -> Self {
        Self::with_ttl(id, username, role, Duration::hours(SESSION_TTL_HOURS))
    }

    pub fn with_ttl(id: i32, username: String, role: UserRole, ttl: Duration) -> Self {
        let now = Local::now();

        Self {
            user_id: id,
            username,
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

/// The authenticated caller identity, as handlers and actions see it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authorized_for(self) {
            return Err(ApiError::PermissionDenied(String::from(
                "you don't have permission to perform this action",
            )));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(session: JwtSessionData) -> Self {
        Self {
            user_id: session.user_id,
            username: session.username,
            is_admin: session.role == UserRole::Admin,
            role: session.role,
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, ApiError> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::Internal(String::from("invalid session secret")))
}

pub fn generate_session_token(user: &User, secret: &str) -> Result<String, ApiError> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.role.to_owned());

    claims
        .sign_with_key(&key)
        .map_err(|e| ApiError::Internal(format!("could not sign session token: {e}")))
}

pub fn verify_session_token(token: &str, secret: &str) -> Result<JwtSessionData, ApiError> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| ApiError::Unauthorized(String::from("invalid session token")))?;

    if session.exp <= Local::now().timestamp() {
        return Err(ApiError::Unauthorized(String::from("session expired")));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::from("hash"),
            role: UserRole::User,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let token = generate_session_token(&user(), "secret").unwrap();
        let session = verify_session_token(&token, "secret").unwrap();
        assert_eq!(session.user_id, 1);
        assert_eq!(session.username, "cook");

        let session: SessionData = session.into();
        assert!(!session.is_admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_session_token(&user(), "secret").unwrap();
        assert!(matches!(
            verify_session_token(&token, "other"),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_session_is_rejected() {
        let key: Hmac<Sha256> = Hmac::new_from_slice(b"secret").unwrap();
        let claims = JwtSessionData::with_ttl(
            1,
            String::from("cook"),
            UserRole::User,
            Duration::hours(-1),
        );
        let token = claims.sign_with_key(&key).unwrap();

        assert!(matches!(
            verify_session_token(&token, "secret"),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
