//! HTTP surface of the `foundry` server.

pub mod config;
pub mod runs;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// Error body shared by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ApiResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.into(),
        }),
    )
}
