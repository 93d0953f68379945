use crate::error::ApiError;

/// Bridge between `sqlx::Error` and the crate error taxonomy. Unique
/// violations are kept distinguishable so call sites expecting duplicates
/// can surface them as validation errors instead of server faults.
#[derive(Debug)]
pub struct QueryError {
    info: String,
    unique_violation: bool,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            unique_violation: false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.unique_violation
    }

    /// Shorthand for the `sqlx::Error` to `ApiError` chain at query call
    /// sites, with a fixed target type so `map_err` needs no annotation.
    pub fn api(error: sqlx::Error) -> ApiError {
        ApiError::from(QueryError::from(error))
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self {
                unique_violation: e.code().as_deref() == Some("23505"),
                info: format!("{e}"),
            },
            sqlx::Error::RowNotFound => Self::new(String::from("row not found")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(String::from("pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("worker crashed")),
            other => Self::new(format!("{other}")),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        ApiError::Internal(error.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_errors_surface_as_internal() {
        assert!(matches!(
            QueryError::api(sqlx::Error::PoolTimedOut),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            QueryError::api(sqlx::Error::RowNotFound),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn manual_query_errors_are_not_unique_violations() {
        assert!(!QueryError::new(String::from("boom")).is_unique_violation());
    }
}
