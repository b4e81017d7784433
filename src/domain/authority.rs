//! Port to the external telephony authority
//!
//! The authority is the system of record for live sessions. The registry
//! only asks it to perform actions and mirrors the outcome; adapters for a
//! concrete platform live in the infrastructure layer.

use crate::domain::action::Transaction;
use crate::domain::call::Handle;
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The authority refused a submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Authority-side flags for a call; opaque to the registry beyond display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityCallState {
    pub is_outgoing: bool,
    pub has_connected: bool,
    pub is_on_hold: bool,
}

/// A call as currently observed by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCall {
    pub call_id: CallId,
    pub state: AuthorityCallState,
}

/// Events the authority reports on its own initiative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "call_id", rename_all = "snake_case")]
pub enum AuthorityEvent {
    Connected(CallId),
    Ended(CallId),
}

/// Gateway to the telephony authority
///
/// `submit` resolves exactly once per transaction and never retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorityGateway: Send + Sync {
    /// Submit an atomic batch of actions
    async fn submit(&self, transaction: Transaction) -> Result<(), Rejection>;

    /// Calls the authority currently knows about, including ones we did not create
    async fn observed_calls(&self) -> Vec<ObservedCall>;

    /// Tell the authority an outgoing call has connected
    async fn report_connected(&self, call_id: CallId);

    /// Announce a new incoming call
    async fn report_incoming_call(
        &self,
        call_id: CallId,
        handle: Handle,
        has_video: bool,
    ) -> Result<(), Rejection>;
}
