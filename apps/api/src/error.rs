//! HTTP error mapping.
//!
//! ```text
//! ErrorKind::Validation  → 400
//! (missing/bad token)    → 401
//! ErrorKind::Permission  → 403
//! ErrorKind::NotFound    → 404
//! ErrorKind::Conflict    → 409   (incl. modificacion_concurrente)
//! infrastructure         → 500
//! ```
//!
//! Body: `{ "code": <stable reason>, "message": <human text> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use comanda_core::ErrorKind;
use comanda_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Unauthenticated(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Engine(err) => match err.kind() {
                Some(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
                Some(ErrorKind::Permission) => StatusCode::FORBIDDEN,
                Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
                Some(ErrorKind::Conflict) => StatusCode::CONFLICT,
                None => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "no_autenticado",
            ApiError::Engine(err) => err.reason(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "error interno".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "code": self.code(), "message": message }))).into_response()
    }
}
