//! Command surface integration tests

use callkeep::domain::shared::CallId;
use callkeep::infrastructure::authority::MemoryAuthority;
use callkeep::interface::command::{CommandError, CommandHandler, EndOutcome};
use callkeep::{CallError, CallRegistry, RegistryOptions};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn setup() -> (Arc<MemoryAuthority>, CallRegistry, CommandHandler) {
    let authority = Arc::new(MemoryAuthority::new(Duration::from_millis(10)));
    let registry = CallRegistry::new(authority.clone(), RegistryOptions::default());
    let handler = CommandHandler::new(registry.clone());
    (authority, registry, handler)
}

fn start_call(id: CallId) -> Value {
    json!({
        "method": "startCall",
        "args": {
            "id": id.to_string(),
            "handle": "+15551234",
            "handleType": "number",
            "hasVideo": false,
            "callerName": "Alice"
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_start_call_returns_call_data() {
    let (_authority, registry, handler) = setup();
    let id = CallId::new();

    let response = assert_ok!(handler.handle_json(start_call(id)).await);
    assert_eq!(response["id"], json!(id.to_string()));
    assert_eq!(response["handle"], "+15551234");
    assert_eq!(response["handleType"], "number");
    assert_eq!(response["callerName"], "Alice");
    assert_eq!(response["isOutgoing"], true);
    assert_eq!(response["status"], "connecting");
    assert_eq!(response["isOnHold"], false);

    assert!(registry.lookup(id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_handle_type_falls_back_to_generic() {
    let (_authority, _registry, handler) = setup();

    let response = assert_ok!(
        handler
            .handle_json(json!({
                "method": "reportIncomingCall",
                "args": { "handle": "room-7", "handleType": "sip" }
            }))
            .await
    );
    assert_eq!(response["handleType"], "generic");
    assert_eq!(response["status"], "ringing");
    assert_eq!(response["isOutgoing"], false);
}

#[tokio::test(start_paused = true)]
async fn test_hold_and_mute_round_trip() {
    let (_authority, registry, handler) = setup();
    let id = CallId::new();
    assert_ok!(handler.handle_json(start_call(id)).await);

    assert_ok!(
        handler
            .handle_json(json!({ "method": "connectCall", "args": { "id": id.to_string() } }))
            .await
    );
    assert_ok!(
        handler
            .handle_json(json!({
                "method": "setHeld",
                "args": { "id": id.to_string(), "onHold": true }
            }))
            .await
    );
    assert_ok!(
        handler
            .handle_json(json!({
                "method": "setMuted",
                "args": { "id": id.to_string(), "muted": true }
            }))
            .await
    );

    let call = registry.lookup(id).unwrap();
    assert!(call.is_on_hold);
    assert!(call.is_muted);
}

#[tokio::test]
async fn test_end_unknown_call_reports_not_found() {
    let (_authority, _registry, handler) = setup();
    let id = CallId::new();

    let error = assert_err!(
        handler
            .handle_json(json!({ "method": "endCall", "args": { "id": id.to_string() } }))
            .await
    );
    assert!(matches!(error, CommandError::Call(CallError::NotFound(missing)) if missing == id));
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let (authority, _registry, handler) = setup();

    let error = assert_err!(handler.handle_json(json!({ "method": "startCall" })).await);
    assert!(matches!(error, CommandError::Json(_)));

    let error = assert_err!(
        handler
            .handle_json(json!({ "method": "endCall", "args": { "id": "not-a-uuid" } }))
            .await
    );
    assert!(matches!(error, CommandError::Call(CallError::Validation(_))));

    assert_eq!(authority.submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_active_calls_and_end_all() {
    let (authority, registry, handler) = setup();
    let ours = CallId::new();
    let external = CallId::new();
    assert_ok!(handler.handle_json(start_call(ours)).await);
    authority.observe_external_call(external, false).await;

    let active = assert_ok!(handler.handle_json(json!({ "method": "activeCalls" })).await);
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0]["handle"], "+15551234");
    assert_eq!(active[1], json!({ "id": external.to_string() }));

    let ended = assert_ok!(handler.handle_json(json!({ "method": "endAllCalls" })).await);
    let outcomes: Vec<EndOutcome> = serde_json::from_value(ended).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| outcome.ok));

    assert!(registry.is_empty());
    let active = assert_ok!(handler.handle_json(json!({ "method": "activeCalls" })).await);
    assert_eq!(active, json!([]));
}

#[tokio::test]
async fn test_lossy_handler_folds_errors() {
    let (_authority, _registry, handler) = setup();

    let response = handler
        .handle_json_lossy(json!({ "method": "hangUp", "args": {} }))
        .await;
    assert!(response["error"].as_str().unwrap().starts_with("Malformed command"));
}
