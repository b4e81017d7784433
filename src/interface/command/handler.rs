//! Command handler

use super::dto::{CallData, CallIdData, EndOutcome, SetHeldData, SetMutedData};
use crate::domain::call_registry::CallRegistry;
use crate::domain::shared::value_objects::CallId;
use crate::domain::CallError;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

/// Command decoding or execution failure
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Malformed command: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Call(#[from] CallError),
}

/// Typed inbound command, encoded as `{"method": ..., "args": {...}}`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum CallCommand {
    StartCall(CallData),
    ReportIncomingCall(CallData),
    ConnectCall(CallIdData),
    EndCall(CallIdData),
    EndAllCalls,
    SetMuted(SetMutedData),
    SetHeld(SetHeldData),
    ActiveCalls,
}

impl CallCommand {
    pub fn method(&self) -> &'static str {
        match self {
            CallCommand::StartCall(_) => "startCall",
            CallCommand::ReportIncomingCall(_) => "reportIncomingCall",
            CallCommand::ConnectCall(_) => "connectCall",
            CallCommand::EndCall(_) => "endCall",
            CallCommand::EndAllCalls => "endAllCalls",
            CallCommand::SetMuted(_) => "setMuted",
            CallCommand::SetHeld(_) => "setHeld",
            CallCommand::ActiveCalls => "activeCalls",
        }
    }
}

/// Fulfils inbound commands against a registry
#[derive(Clone)]
pub struct CommandHandler {
    registry: CallRegistry,
}

impl CommandHandler {
    pub fn new(registry: CallRegistry) -> Self {
        Self { registry }
    }

    /// Decode and run a raw JSON request
    pub async fn handle_json(&self, request: Value) -> Result<Value, CommandError> {
        let command: CallCommand = serde_json::from_value(request)?;
        self.handle(command).await
    }

    pub async fn handle(&self, command: CallCommand) -> Result<Value, CommandError> {
        info!("Command: {}", command.method());

        let response = match command {
            CallCommand::StartCall(data) => {
                let snapshot = self.registry.start_call(data.into_spec()?).await?;
                serde_json::to_value(snapshot)?
            }
            CallCommand::ReportIncomingCall(data) => {
                let snapshot = self.registry.report_incoming_call(data.into_spec()?).await?;
                serde_json::to_value(snapshot)?
            }
            CallCommand::ConnectCall(data) => {
                self.registry.connect_call(data.call_id()?).await?;
                Value::Null
            }
            CallCommand::EndCall(data) => {
                self.registry.request_end(data.call_id()?).await?;
                Value::Null
            }
            CallCommand::EndAllCalls => {
                let outcomes: Vec<EndOutcome> = self
                    .registry
                    .request_end_all()
                    .await
                    .iter()
                    .map(|(id, result)| EndOutcome::from_result(*id, result))
                    .collect();
                serde_json::to_value(outcomes)?
            }
            CallCommand::SetMuted(data) => {
                let call_id = data.id.parse::<CallId>()?;
                self.registry.request_set_mute(call_id, data.muted).await?;
                Value::Null
            }
            CallCommand::SetHeld(data) => {
                let call_id = data.id.parse::<CallId>()?;
                self.registry.request_set_hold(call_id, data.on_hold).await?;
                Value::Null
            }
            CallCommand::ActiveCalls => {
                serde_json::to_value(self.registry.active_calls_snapshot().await)?
            }
        };

        Ok(response)
    }

    /// Like [`handle_json`](Self::handle_json), but folds failures into an
    /// `{"error": ...}` map for transports that only carry values
    pub async fn handle_json_lossy(&self, request: Value) -> Value {
        match self.handle_json(request).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Command failed: {}", e);
                serde_json::json!({ "error": e.to_string() })
            }
        }
    }
}
