use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, message = %self, "Request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        let message = error.to_string();
        tracing::error!(db_error = %message, "Database query failed");

        if message.contains("23505")
            || message
                .to_ascii_lowercase()
                .contains("duplicate key value violates unique constraint")
        {
            return Self::Conflict("Duplicate value violates a unique constraint.".to_string());
        }
        Self::Dependency("Database operation failed.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::http::StatusCode;

    #[test]
    fn status_codes_match_variants() {
        assert_eq!(
            AppError::BadRequest(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound(String::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict(String::new()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Dependency(String::new()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn duplicate_key_maps_to_conflict() {
        let error = sqlx::Error::Protocol(
            "duplicate key value violates unique constraint \"rent_ledger_tenant_id_room_id_bill_year_bill_month_key\""
                .to_string(),
        );
        assert!(matches!(AppError::from(error), AppError::Conflict(_)));
    }
}
