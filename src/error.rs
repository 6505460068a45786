use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::InvalidTransition;
use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Unauthorized,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    #[error("Insufficient stock for: {0}")]
    InsufficientStock(String),

    #[error("Payment provider not supported: {0}")]
    ProviderNotSupported(String),

    #[error("Payment method {method} is not supported by provider {provider}")]
    MethodNotSupported { provider: String, method: String },

    #[error("Inventory service unavailable: {0}")]
    InventoryUnavailable(String),

    #[error("Payment provider error: {0}")]
    ProviderError(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<InvalidTransition> for AppError {
    fn from(err: InvalidTransition) -> Self {
        AppError::InvalidState(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::ProductUnavailable(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock(_) => StatusCode::CONFLICT,
            AppError::ProviderNotSupported(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotSupported { .. } => StatusCode::BAD_REQUEST,
            AppError::InventoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ProviderError(_) => StatusCode::BAD_GATEWAY,
            AppError::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OrmError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiResponse::<serde_json::Value>::error(self.to_string());

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
