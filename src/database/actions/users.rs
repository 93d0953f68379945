use sqlx::{Pool, Postgres};

use crate::{
    authentication::cryptography::{hash_password, verify_password},
    authentication::jwt::generate_session_token,
    constants::RESERVED_USERNAMES,
    database::error::QueryError,
    database::schema::{NewUser, User, UserProfile, Uuid},
    error::{ApiError, ValidationError},
};

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    if username.is_empty() {
        errors.push("username", "username must not be empty");
    } else {
        if RESERVED_USERNAMES
            .iter()
            .any(|reserved| username.eq_ignore_ascii_case(reserved))
        {
            errors.push("username", "this username is reserved");
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
        {
            errors.push("username", "username contains invalid characters");
        }
    }
    errors.into_result()
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
        _ => errors.push("email", "enter a valid email address"),
    }
    errors.into_result()
}

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(row)
}

pub async fn get_user_by_id(
    pool: &Pool<Postgres>,
    user_id: Uuid,
) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::api)?;

    Ok(row)
}

/// Registers a user; the password is hashed before it reaches storage.
/// A taken email or username surfaces as a validation error.
pub async fn register_user(payload: NewUser, pool: &Pool<Postgres>) -> Result<UserProfile, ApiError> {
    let mut errors = ValidationError::new();
    if let Err(e) = validate_username(&payload.username) {
        errors.merge(e);
    }
    if let Err(e) = validate_email(&payload.email) {
        errors.merge(e);
    }
    if payload.password.is_empty() {
        errors.push("password", "password must not be empty");
    }
    errors.into_result()?;

    let password = hash_password(&payload.password)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

    let row: Option<(Uuid,)> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING id;
    ",
    )
    .bind(&payload.email)
    .bind(&payload.username)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::api)?;

    match row {
        Some((id,)) => Ok(UserProfile {
            id,
            email: payload.email,
            username: payload.username,
            first_name: payload.first_name,
            last_name: payload.last_name,
            is_subscribed: false,
        }),
        None => Err(ApiError::single(
            "email",
            "a user with this email or username already exists",
        )),
    }
}

/// Checks the credentials and issues a signed session token.
pub async fn login_user(
    email: &str,
    password: &str,
    secret: &str,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let user = get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(String::from("invalid credentials")))?;

    let authenticated = verify_password(password, &user.password)
        .map_err(|_| ApiError::Unauthorized(String::from("invalid credentials")))?;
    if !authenticated {
        return Err(ApiError::Unauthorized(String::from("invalid credentials")));
    }

    generate_session_token(&user, secret)
}

/// Profile with the subscription flag relative to the viewer. Anonymous
/// viewers bind NULL, so the membership check is always false.
pub async fn get_profile(
    user_id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    let row: Option<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS(
                SELECT 1 FROM subscriptions s
                WHERE s.user_id = $2 AND s.author_id = u.id
            ) AS is_subscribed
        FROM users u
        WHERE u.id = $1
    ",
    )
    .bind(user_id)
    .bind(viewer)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::api)?;

    row.ok_or_else(|| ApiError::NotFound(String::from("no user exists with the specified id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_username_is_rejected() {
        assert!(validate_username("me").is_err());
        assert!(validate_username("Me").is_err());
        assert!(validate_username("melissa").is_ok());
    }

    #[test]
    fn username_character_class() {
        assert!(validate_username("cook_01.a@b+c-d").is_ok());
        assert!(validate_username("cook 01").is_err());
        assert!(validate_username("cook!").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn email_needs_one_at_sign() {
        assert!(validate_email("cook@example.com").is_ok());
        assert!(validate_email("cook").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("cook@").is_err());
        assert!(validate_email("cook@a@b").is_err());
    }
}
