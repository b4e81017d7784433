//! Call registry integration tests against the in-memory authority

use callkeep::domain::call::{CallStatus, CallView, Handle};
use callkeep::domain::shared::CallId;
use callkeep::infrastructure::authority::MemoryAuthority;
use callkeep::{CallError, CallRegistry, CallSpec, CallsChanged, RegistryOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

const CONNECT_DELAY: Duration = Duration::from_millis(1000);

fn setup(latency: Duration) -> (Arc<MemoryAuthority>, CallRegistry) {
    let authority = Arc::new(MemoryAuthority::new(latency));
    let registry = CallRegistry::new(
        authority.clone(),
        RegistryOptions {
            connect_report_delay: CONNECT_DELAY,
            notification_capacity: 64,
        },
    );
    (authority, registry)
}

fn count_notifications(rx: &mut broadcast::Receiver<CallsChanged>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn start_connected(registry: &CallRegistry) -> CallId {
    let call = assert_ok!(
        registry
            .start_call(CallSpec::new(Handle::phone_number("+15551234")))
            .await
    );
    tokio::time::sleep(CONNECT_DELAY * 2).await;
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Active);
    call.id
}

#[tokio::test(start_paused = true)]
async fn test_outgoing_call_scenario() {
    let (authority, registry) = setup(Duration::from_millis(20));
    let id = CallId::new();

    let call = assert_ok!(
        registry
            .start_call(
                CallSpec::new(Handle::phone_number("+15551234"))
                    .with_id(id)
                    .with_video(false)
            )
            .await
    );
    assert_eq!(call.id, id);

    // Not active until the deferred report fires
    let looked_up = registry.lookup(id).unwrap();
    assert_eq!(looked_up.status, CallStatus::Connecting);
    assert!(!authority.call_state(id).await.unwrap().has_connected);

    tokio::time::sleep(CONNECT_DELAY + Duration::from_millis(100)).await;
    let looked_up = registry.lookup(id).unwrap();
    assert_eq!(looked_up.status, CallStatus::Active);
    assert!(looked_up.connected_at.is_some());
    assert!(authority.call_state(id).await.unwrap().has_connected);

    assert_ok!(registry.request_end(id).await);
    assert!(registry.lookup(id).is_none());
    assert!(authority.call_state(id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_hold_on_same_call_applies_once() {
    let (_authority, registry) = setup(Duration::from_millis(50));
    let id = start_connected(&registry).await;

    let (first, second) = tokio::join!(
        registry.request_set_hold(id, true),
        registry.request_set_hold(id, true)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.contains(&Err(CallError::Busy(id))));

    let call = registry.lookup(id).unwrap();
    assert_eq!(call.status, CallStatus::Held);
    assert!(call.is_on_hold);
}

#[tokio::test(start_paused = true)]
async fn test_actions_on_different_calls_run_concurrently() {
    let (_authority, registry) = setup(Duration::from_millis(50));
    let first = start_connected(&registry).await;
    let second = start_connected(&registry).await;

    let (a, b) = tokio::join!(
        registry.request_set_hold(first, true),
        registry.request_set_mute(second, true)
    );
    assert_ok!(a);
    assert_ok!(b);

    assert!(registry.lookup(first).unwrap().is_on_hold);
    assert!(registry.lookup(second).unwrap().is_muted);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_still_reconciles() {
    let (_authority, registry) = setup(Duration::from_millis(50));
    let id = start_connected(&registry).await;

    // Caller stops waiting before the authority answers
    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), registry.request_set_hold(id, true)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.lookup(id).unwrap().status, CallStatus::Held);

    // The claim was released, so the next action goes through
    assert_ok!(registry.request_set_hold(id, false).await);
    assert_eq!(registry.lookup(id).unwrap().status, CallStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_end_keeps_call() {
    let (authority, registry) = setup(Duration::ZERO);
    let id = start_connected(&registry).await;
    let mut rx = registry.subscribe();

    authority.reject(id, "call is emergency").await;
    let result = registry.request_end(id).await;
    assert_eq!(
        result,
        Err(CallError::AuthorityRejected("call is emergency".to_string()))
    );

    assert_eq!(registry.lookup(id).unwrap().status, CallStatus::Active);
    assert_eq!(count_notifications(&mut rx), 0);
}

#[tokio::test]
async fn test_end_unknown_call_does_not_notify() {
    let (authority, registry) = setup(Duration::ZERO);
    let mut rx = registry.subscribe();

    let id = CallId::new();
    assert_eq!(registry.request_end(id).await, Err(CallError::NotFound(id)));
    assert_eq!(count_notifications(&mut rx), 0);
    assert_eq!(authority.submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_after_clear_returns_minimal_views() {
    let (authority, registry) = setup(Duration::ZERO);
    start_connected(&registry).await;
    start_connected(&registry).await;
    authority.observe_external_call(CallId::new(), false).await;

    let views = registry.active_calls_snapshot().await;
    assert_eq!(views.len(), 3);
    assert_eq!(views.iter().filter(|view| view.is_known()).count(), 2);

    assert_eq!(registry.remove_all_calls(), 2);

    let views = registry.active_calls_snapshot().await;
    assert_eq!(views.len(), 3);
    assert!(views
        .iter()
        .all(|view| matches!(view, CallView::Unknown { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_end_all_reports_each_call_independently() {
    let (authority, registry) = setup(Duration::from_millis(10));
    let ours = start_connected(&registry).await;
    let refused = start_connected(&registry).await;
    let external = CallId::new();
    authority.observe_external_call(external, true).await;
    authority.reject(refused, "not allowed").await;

    let outcomes = registry.request_end_all().await;
    assert_eq!(outcomes.len(), 3);

    for (id, outcome) in &outcomes {
        if *id == refused {
            assert_err!(outcome);
        } else {
            assert_ok!(outcome);
        }
    }

    assert!(registry.lookup(ours).is_none());
    assert!(registry.lookup(refused).is_some());
    let remaining: Vec<CallId> = registry
        .active_calls_snapshot()
        .await
        .iter()
        .map(|view| view.id())
        .collect();
    assert_eq!(remaining, vec![refused]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_hang_up_removes_call() {
    let (authority, registry) = setup(Duration::ZERO);
    let follower = registry.follow(authority.subscribe());
    let id = start_connected(&registry).await;

    assert!(authority.hang_up_remotely(id).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(registry.lookup(id).is_none());

    follower.abort();
}

#[tokio::test(start_paused = true)]
async fn test_incoming_call_answered_remotely() {
    let (authority, registry) = setup(Duration::ZERO);
    let follower = registry.follow(authority.subscribe());

    let call = assert_ok!(
        registry
            .report_incoming_call(
                CallSpec::new(Handle::email("bob@example.com")).with_caller_name("Bob")
            )
            .await
    );
    assert_eq!(call.status, CallStatus::Ringing);
    assert!(!call.is_outgoing);

    // No deferred report for incoming calls
    tokio::time::sleep(CONNECT_DELAY * 2).await;
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Ringing);

    assert!(authority.answer_remotely(call.id).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Active);

    follower.abort();
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_is_rejected() {
    let (_authority, registry) = setup(Duration::ZERO);
    let id = CallId::new();
    let spec = CallSpec::new(Handle::phone_number("+15551234")).with_id(id);

    assert_ok!(registry.start_call(spec.clone()).await);
    assert_eq!(
        registry.start_call(spec).await,
        Err(CallError::AlreadyExists(id))
    );
    assert_eq!(registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_call_skips_delay() {
    let (authority, registry) = setup(Duration::ZERO);
    let call = assert_ok!(
        registry
            .start_call(CallSpec::new(Handle::generic("room-42")))
            .await
    );

    assert_ok!(registry.connect_call(call.id).await);
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Active);
    assert!(authority.call_state(call.id).await.unwrap().has_connected);

    // The deferred report later finds nothing to do
    tokio::time::sleep(CONNECT_DELAY * 2).await;
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Active);

    let result = registry.connect_call(call.id).await;
    assert!(matches!(result, Err(CallError::InvalidTransition(_))));
}

#[tokio::test(start_paused = true)]
async fn test_states_stay_within_state_machine() {
    let (_authority, registry) = setup(Duration::from_millis(5));
    let id = start_connected(&registry).await;

    let allowed = [
        CallStatus::Dialing,
        CallStatus::Ringing,
        CallStatus::Connecting,
        CallStatus::Active,
        CallStatus::Held,
    ];

    // Alternate valid and invalid requests; invalid ones must never land
    for round in 0..6 {
        let on_hold = round % 2 == 0;
        assert_ok!(registry.request_set_hold(id, on_hold).await);
        assert_err!(registry.request_set_hold(id, on_hold).await);
        assert_ok!(registry.request_set_mute(id, on_hold).await);

        let call = registry.lookup(id).unwrap();
        assert!(allowed.contains(&call.status));
        assert_eq!(call.is_on_hold, call.status == CallStatus::Held);
        assert_eq!(call.is_on_hold, on_hold);
        assert_eq!(call.is_muted, on_hold);
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_end_in_flight_is_busy() {
    let (authority, registry) = setup(Duration::from_millis(50));
    let call = assert_ok!(
        registry
            .start_call(CallSpec::new(Handle::phone_number("+15551234")))
            .await
    );
    assert_eq!(call.status, CallStatus::Connecting);

    let (ended, connected) = tokio::join!(
        registry.request_end(call.id),
        registry.connect_call(call.id)
    );
    assert_ok!(ended);
    assert_eq!(connected, Err(CallError::Busy(call.id)));

    assert!(registry.lookup(call.id).is_none());
    assert!(authority.call_state(call.id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connected_report_waits_for_in_flight_action() {
    let (authority, registry) = setup(Duration::from_millis(50));
    let call = assert_ok!(
        registry
            .start_call(CallSpec::new(Handle::phone_number("+15551234")))
            .await
    );

    // Keep a mute outstanding across the moment the report is due
    tokio::time::sleep(CONNECT_DELAY - Duration::from_millis(20)).await;
    assert_ok!(registry.request_set_mute(call.id, true).await);
    assert_eq!(registry.lookup(call.id).unwrap().status, CallStatus::Connecting);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let looked_up = registry.lookup(call.id).unwrap();
    assert_eq!(looked_up.status, CallStatus::Active);
    assert!(looked_up.is_muted);
    assert!(authority.call_state(call.id).await.unwrap().has_connected);
}
