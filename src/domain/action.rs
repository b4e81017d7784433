//! Action requests addressed to the telephony authority

use crate::domain::call::Handle;
use crate::domain::shared::value_objects::CallId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Mutating intent against one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallAction {
    Start { handle: Handle, has_video: bool },
    End,
    SetHeld { on_hold: bool },
    SetMuted { muted: bool },
}

impl CallAction {
    pub fn name(&self) -> &'static str {
        match self {
            CallAction::Start { .. } => "start",
            CallAction::End => "end",
            CallAction::SetHeld { .. } => "set_held",
            CallAction::SetMuted { .. } => "set_muted",
        }
    }
}

/// One action addressed to a specific call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub call_id: CallId,
    pub action: CallAction,
}

impl ActionRequest {
    pub fn start(call_id: CallId, handle: Handle, has_video: bool) -> Self {
        Self {
            call_id,
            action: CallAction::Start { handle, has_video },
        }
    }

    pub fn end(call_id: CallId) -> Self {
        Self {
            call_id,
            action: CallAction::End,
        }
    }

    pub fn set_held(call_id: CallId, on_hold: bool) -> Self {
        Self {
            call_id,
            action: CallAction::SetHeld { on_hold },
        }
    }

    pub fn set_muted(call_id: CallId, muted: bool) -> Self {
        Self {
            call_id,
            action: CallAction::SetMuted { muted },
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.action.name(), self.call_id)
    }
}

/// Atomic submission of one or more action requests.
///
/// The authority applies every action or none of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    actions: Vec<ActionRequest>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            actions: Vec::new(),
        }
    }

    pub fn single(request: ActionRequest) -> Self {
        Self::new().with_action(request)
    }

    pub fn with_action(mut self, request: ActionRequest) -> Self {
        self.actions.push(request);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn actions(&self) -> &[ActionRequest] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", actions.join(", "))
    }
}
