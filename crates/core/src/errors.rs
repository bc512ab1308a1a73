use thiserror::Error;

use crate::domain::ticket::TicketStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid ticket status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: TicketStatus, to: TicketStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// HTTP-facing error shape: user-safe message plus a correlation id for the
/// operator to chase in the logs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The message could not be processed. Check the request and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        match &mut self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::ServiceUnavailable { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        self
    }
}

impl From<crate::flow::orchestrator::EngineError> for InterfaceError {
    fn from(value: crate::flow::orchestrator::EngineError) -> Self {
        use crate::flow::orchestrator::EngineError;

        match value {
            EngineError::EmptyInput
            | EngineError::MalformedTicketReference(_)
            | EngineError::ForeignTicketReference(_) => Self::BadRequest {
                message: value.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            EngineError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            EngineError::Store(error) => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
        }
    }
}
