//! Application error type and its HTTP representation.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::services::architect::LLMError;
use crate::services::investigator::InvestigatorError;
use crate::services::orchestrator::OrchestratorError;
use crate::services::warehouse::ConnectorError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("missing reason: {0}")]
    MissingReason(String),

    #[error("duplicate enrollment: {0}")]
    DuplicateEnrollment(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("llm error: {0}")]
    Llm(#[from] LLMError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("investigator error: {0}")]
    Investigator(#[from] InvestigatorError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn missing_reason(msg: impl Into<String>) -> Self {
        Self::MissingReason(msg.into())
    }

    pub fn duplicate_enrollment(msg: impl Into<String>) -> Self {
        Self::DuplicateEnrollment(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable machine-readable code, never the warehouse URI or LLM prompt text.
    fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::MissingReason(_) => "MISSING_REASON",
            Self::DuplicateEnrollment(_) => "DUPLICATE_ENROLLMENT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Connector(_) => "CONNECTOR_ERROR",
            Self::Llm(_) => "LLM_ERROR",
            Self::Orchestrator(_) => "ORCHESTRATOR_ERROR",
            Self::Investigator(_) => "INVESTIGATOR_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::InvalidTransition(_)
            | Self::MissingReason(_)
            | Self::DuplicateEnrollment(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Connector(_) | Self::Llm(_) => StatusCode::BAD_GATEWAY,
            Self::Orchestrator(e) => match e {
                OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::InvalidTransition(_) | OrchestratorError::MissingReason(_) => {
                    StatusCode::BAD_REQUEST
                },
                OrchestratorError::Database(_) | OrchestratorError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            Self::Investigator(e) => match e {
                InvestigatorError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                InvestigatorError::Api(_) | InvestigatorError::Parse(_) | InvestigatorError::Timeout(_) => {
                    StatusCode::BAD_GATEWAY
                },
            },
            Self::Database(_) | Self::Serialization(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {:?}", self);
        } else {
            tracing::debug!("request error: {:?}", self);
        }
        let body = ErrorBody { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
