// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conductor_core::IdError;
use conductor_engine::SupervisorError;
use conductor_storage::{MessageLogError, RunStoreError};
use serde_json::json;
use thiserror::Error;

use crate::stream::StreamError;
use crate::supervisor::StartError;

/// Error returned by a handler, rendered as `{error: {code, message}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "request failed");
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code(), "message": self.to_string() } });
        (self.status(), Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(e: IdError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<RunStoreError> for ApiError {
    fn from(e: RunStoreError) -> Self {
        match e {
            RunStoreError::InvalidId(e) => e.into(),
            RunStoreError::NotFound(id) => ApiError::NotFound(format!("not found: {id}")),
            other => ApiError::internal(other),
        }
    }
}

impl From<MessageLogError> for ApiError {
    fn from(e: MessageLogError) -> Self {
        match e {
            MessageLogError::SinceIdNotFound(id) => {
                ApiError::NotFound(format!("message not found: {id}"))
            }
            MessageLogError::InvalidMessage(reason) => ApiError::BadRequest(reason.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::RunNotFound(_) => ApiError::NotFound(e.to_string()),
            StreamError::MaxClients { .. } => ApiError::TooManyRequests(e.to_string()),
            StreamError::Io(_) => ApiError::internal(e),
        }
    }
}

impl From<StartError> for ApiError {
    fn from(e: StartError) -> Self {
        ApiError::Conflict(e.to_string())
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Storage(e) => e.into(),
            SupervisorError::Log(e) => e.into(),
            other => ApiError::internal(other),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::internal(e)
    }
}
