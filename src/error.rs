use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ethereum RPC error: {0}")]
    Rpc(String),

    #[error("Rate oracle error: {0}")]
    RateOracle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    fn status_and_code(&self) -> (StatusCode, u16) {
        match self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, 401),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 404),
            AppError::Internal(_) | AppError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, 500)
            }
            // validation, invariant and upstream failures all surface as 400
            _ => (StatusCode::BAD_REQUEST, 400),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Success envelope: every endpoint responds `{"result": …}`.
pub struct ApiResult<T>(pub T);

#[derive(Serialize)]
struct ResultEnvelope<T> {
    result: T,
}

impl<T: Serialize> IntoResponse for ApiResult<T> {
    fn into_response(self) -> Response {
        Json(ResultEnvelope { result: self.0 }).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
