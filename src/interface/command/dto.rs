//! Command DTOs exchanged as key-value JSON maps

use crate::domain::call::{Handle, HandleKind};
use crate::domain::call_registry::CallSpec;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use crate::domain::CallError;
use serde::{Deserialize, Serialize};

/// Start-call or incoming-call payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    /// Session identifier; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub handle: String,
    /// "number", "email" or anything else for generic
    #[serde(default)]
    pub handle_type: Option<String>,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub caller_name: Option<String>,
}

impl CallData {
    pub fn into_spec(self) -> Result<CallSpec> {
        if self.handle.trim().is_empty() {
            return Err(CallError::Validation("handle must not be empty".to_string()));
        }

        let kind = HandleKind::from_wire(self.handle_type.as_deref());
        let mut spec = CallSpec::new(Handle::new(kind, self.handle)).with_video(self.has_video);
        if let Some(id) = self.id {
            spec = spec.with_id(id.parse()?);
        }
        if let Some(name) = self.caller_name {
            spec = spec.with_caller_name(name);
        }
        Ok(spec)
    }
}

/// Payload naming a single call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallIdData {
    pub id: String,
}

impl CallIdData {
    pub fn call_id(&self) -> Result<CallId> {
        self.id.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMutedData {
    pub id: String,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHeldData {
    pub id: String,
    pub on_hold: bool,
}

/// Per-call result of ending all calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndOutcome {
    pub id: CallId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndOutcome {
    pub fn from_result(id: CallId, result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                id,
                ok: true,
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}
