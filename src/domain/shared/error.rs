//! Domain errors

use crate::domain::shared::value_objects::CallId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Authority rejected request: {0}")]
    AuthorityRejected(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Call not found: {0}")]
    NotFound(CallId),

    #[error("Call {0} has an action in flight")]
    Busy(CallId),

    #[error("Call already exists: {0}")]
    AlreadyExists(CallId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
