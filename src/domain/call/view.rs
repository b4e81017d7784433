//! Read-only call views handed out by the registry

use crate::domain::call::value_object::{CallStatus, HandleKind};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full view of a call the registry knows about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub id: CallId,
    pub caller_name: Option<String>,
    pub handle: String,
    pub handle_type: HandleKind,
    pub has_video: bool,
    pub is_outgoing: bool,
    pub status: CallStatus,
    pub is_muted: bool,
    pub is_on_hold: bool,
    pub started_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

/// One entry of the active-calls listing.
///
/// Calls surfaced by the authority that the registry never created are
/// reported with their identifier only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallView {
    Known(CallSnapshot),
    Unknown { id: CallId },
}

impl CallView {
    pub fn id(&self) -> CallId {
        match self {
            CallView::Known(snapshot) => snapshot.id,
            CallView::Unknown { id } => *id,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, CallView::Known(_))
    }
}
