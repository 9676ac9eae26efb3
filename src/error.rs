// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Frontend route that signed-out users are sent to.
pub const LOGIN_PATH: &str = "/login";

/// Frontend route where users pick a plan.
pub const SUBSCRIBE_PATH: &str = "/subscription";

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("An active subscription is required")]
    SubscriptionRequired,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Reddit API error: {0}")]
    RedditApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when Reddit rejects our credentials for an account.
    pub const REDDIT_TOKEN_ERROR: &'static str = "Reddit token rejected";

    /// Whether this error means the stored Reddit grant is no longer usable.
    pub fn is_reddit_token_error(&self) -> bool {
        match self {
            AppError::RedditApi(msg) => {
                msg == Self::REDDIT_TOKEN_ERROR
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Frontend route the client should navigate to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut redirect = None;
        let (status, error, details) = match &self {
            AppError::Unauthorized => {
                redirect = Some(LOGIN_PATH);
                (StatusCode::UNAUTHORIZED, "unauthorized", None)
            }
            AppError::SubscriptionRequired => {
                redirect = Some(SUBSCRIBE_PATH);
                (StatusCode::PAYMENT_REQUIRED, "subscription_required", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::RedditApi(msg) => {
                (StatusCode::BAD_GATEWAY, "reddit_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            redirect,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
