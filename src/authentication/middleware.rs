use std::convert::Infallible;

use warp::{reject::Rejection, Filter};

use crate::constants::SESSION_COOKIE;
use crate::error::ApiError;

use super::jwt::{verify_session_token, SessionData};

/// Requires a valid session cookie; anonymous callers are rejected with an
/// unauthorized error.
pub fn with_session(
    secret: String,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |cookie: Option<String>| {
        let secret = secret.clone();
        async move {
            match cookie {
                Some(token) => verify_session_token(&token, &secret)
                    .map(SessionData::from)
                    .map_err(Rejection::from),
                None => Err(ApiError::Unauthorized(String::from("authentication required")).into()),
            }
        }
    })
}

/// Extracts the session when present and valid, `None` otherwise. Anonymous
/// callers pass through so read-only routes can compute always-false
/// relationship flags.
pub fn with_possible_session(
    secret: String,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).map(move |cookie: Option<String>| {
        cookie
            .and_then(|token| verify_session_token(&token, &secret).ok())
            .map(SessionData::from)
    })
}
