//! Call domain events

use crate::domain::call::value_object::CallStatus;
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What changed on the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallChange {
    Status { from: CallStatus, to: CallStatus },
    Muted { muted: bool },
}

/// A single recorded mutation of a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub change: CallChange,
}

impl CallEvent {
    pub fn new(call_id: CallId, change: CallChange) -> Self {
        Self {
            metadata: EventMetadata::new(),
            call_id,
            change,
        }
    }
}

impl DomainEvent for CallEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            CallChange::Status { to, .. } => match to {
                CallStatus::Dialing => "call.dialing",
                CallStatus::Ringing => "call.ringing",
                CallStatus::Connecting => "call.connecting",
                CallStatus::Active => "call.active",
                CallStatus::Held => "call.held",
                CallStatus::Ended => "call.ended",
            },
            CallChange::Muted { muted: true } => "call.muted",
            CallChange::Muted { muted: false } => "call.unmuted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }
}
