use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{self, Display};

use log::warn;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};
use warp::Reply;

/// Field-keyed validation messages, serialized as `{"field": ["msg", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, message: &str) -> Self {
        self.push(name, message);
        self
    }

    pub fn push(&mut self, name: &str, message: &str) {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (name, messages) in other.fields {
            self.fields.entry(name).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    Validation(ValidationError),
    NotFound(String),
    PermissionDenied(String),
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    /// Validation error with a single field message.
    pub fn single(field: &str, message: &str) -> Self {
        Self::Validation(ValidationError::new().field(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(errors: ValidationError) -> Self {
        Self::Validation(errors)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "validation failed: {errors:?}"),
            Self::NotFound(info)
            | Self::PermissionDenied(info)
            | Self::Unauthorized(info)
            | Self::Internal(info) => write!(f, "{info}"),
        }
    }
}

impl std::error::Error for ApiError {}

// warp's blanket `From<T: Reject> for Rejection` covers the conversion used
// by `?` in handlers and filters.
impl Reject for ApiError {}

#[derive(Serialize)]
struct Detail {
    detail: String,
}

/// Maps rejections onto the JSON error contract: validation failures carry
/// the field map, everything else a `detail` message.
pub async fn recover_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(error) = err.find::<ApiError>() {
        let body = match error {
            ApiError::Validation(fields) => warp::reply::json(fields),
            other => warp::reply::json(&Detail {
                detail: other.to_string(),
            }),
        };
        if let ApiError::Internal(info) = error {
            warn!("internal error: {info}");
        }
        (error.status(), body)
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            warp::reply::json(&Detail {
                detail: String::from("not found"),
            }),
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::body::BodyDeserializeError>().is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            warp::reply::json(&Detail {
                detail: String::from("malformed request"),
            }),
        )
    } else {
        warn!("unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            warp::reply::json(&Detail {
                detail: String::from("internal server error"),
            }),
        )
    };

    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_messages_accumulate_and_merge() {
        let mut errors = ValidationError::new().field("amount", "too small");
        errors.push("amount", "still too small");
        errors.merge(ValidationError::new().field("tags", "required"));

        assert_eq!(errors.messages("amount").len(), 2);
        assert_eq!(errors.messages("tags"), ["required"]);
        assert!(errors.messages("name").is_empty());
    }

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
        assert!(ValidationError::new()
            .field("name", "bad")
            .into_result()
            .is_err());
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::single("x", "y").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound(String::new()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::PermissionDenied(String::new()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Unauthorized(String::new()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn rejections_carry_the_api_error() {
        let rejection = Rejection::from(ApiError::single("name", "bad"));
        assert_eq!(
            rejection.find::<ApiError>(),
            Some(&ApiError::single("name", "bad"))
        );
    }

    #[test]
    fn validation_serializes_as_field_map() {
        let errors = ValidationError::new().field("cooking_time", "too small");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["cooking_time"][0], "too small");
    }
}
