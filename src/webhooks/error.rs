//! Webhook request failures and their HTTP status codes

use crate::services::matrix::DeliveryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid or missing token")]
    Unauthorized,
    #[error("endpoint '{0}' does not exist")]
    EndpointNotFound(String),
    #[error("endpoint '{endpoint}' may not receive {method} requests")]
    MethodNotAllowed { endpoint: String, method: String },
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("missing template variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
    #[error("failed to deliver message: {0}")]
    Delivery(#[from] DeliveryError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::FORBIDDEN,
            WebhookError::EndpointNotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::MissingVariables(_) | WebhookError::Delivery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            // The only failure that explains itself to the caller
            WebhookError::InvalidPayload(_) => {
                (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response()
            }
            other => other.status().into_response(),
        }
    }
}
