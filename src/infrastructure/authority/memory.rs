//! In-memory telephony authority
//!
//! Stands in for the platform call provider: keeps its own record of calls,
//! applies transactions atomically, can be told to refuse actions for a
//! given call, and raises remote hang-up / answer events.

use crate::domain::action::{ActionRequest, CallAction, Transaction};
use crate::domain::authority::{
    AuthorityCallState, AuthorityEvent, AuthorityGateway, ObservedCall, Rejection,
};
use crate::domain::call::Handle;
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct AuthorityCall {
    id: CallId,
    state: AuthorityCallState,
}

impl AuthorityCall {
    fn new(id: CallId, is_outgoing: bool) -> Self {
        Self {
            id,
            state: AuthorityCallState {
                is_outgoing,
                ..Default::default()
            },
        }
    }
}

/// In-memory authority
pub struct MemoryAuthority {
    calls: Arc<RwLock<Vec<AuthorityCall>>>,
    /// call id -> reason every action on that call is refused with
    rejections: Arc<RwLock<HashMap<CallId, String>>>,
    latency: Duration,
    events: broadcast::Sender<AuthorityEvent>,
    submissions: AtomicUsize,
}

impl MemoryAuthority {
    pub fn new(latency: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            rejections: Arc::new(RwLock::new(HashMap::new())),
            latency,
            events,
            submissions: AtomicUsize::new(0),
        }
    }

    /// Events raised by the authority itself
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorityEvent> {
        self.events.subscribe()
    }

    /// Refuse every future action on `call_id`
    pub async fn reject(&self, call_id: CallId, reason: impl Into<String>) {
        self.rejections.write().await.insert(call_id, reason.into());
    }

    pub async fn allow(&self, call_id: CallId) {
        self.rejections.write().await.remove(&call_id);
    }

    /// Record a call the registry never created, e.g. one placed from another app
    pub async fn observe_external_call(&self, call_id: CallId, is_outgoing: bool) {
        let mut calls = self.calls.write().await;
        if calls.iter().all(|call| call.id != call_id) {
            calls.push(AuthorityCall::new(call_id, is_outgoing));
        }
    }

    /// The remote party hung up
    pub async fn hang_up_remotely(&self, call_id: CallId) -> bool {
        let removed = {
            let mut calls = self.calls.write().await;
            let before = calls.len();
            calls.retain(|call| call.id != call_id);
            calls.len() != before
        };

        if removed {
            info!("Authority: call {} ended remotely", call_id);
            let _ = self.events.send(AuthorityEvent::Ended(call_id));
        }
        removed
    }

    /// The remote party answered
    pub async fn answer_remotely(&self, call_id: CallId) -> bool {
        let answered = {
            let mut calls = self.calls.write().await;
            match calls.iter_mut().find(|call| call.id == call_id) {
                Some(call) => {
                    call.state.has_connected = true;
                    true
                }
                None => false,
            }
        };

        if answered {
            let _ = self.events.send(AuthorityEvent::Connected(call_id));
        }
        answered
    }

    pub async fn call_state(&self, call_id: CallId) -> Option<AuthorityCallState> {
        self.calls
            .read()
            .await
            .iter()
            .find(|call| call.id == call_id)
            .map(|call| call.state)
    }

    /// Number of transactions submitted so far
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

fn apply_action(calls: &mut Vec<AuthorityCall>, request: &ActionRequest) -> Result<(), Rejection> {
    let call_id = request.call_id;
    let position = calls.iter().position(|call| call.id == call_id);

    match (&request.action, position) {
        (CallAction::Start { .. }, None) => {
            calls.push(AuthorityCall::new(call_id, true));
            Ok(())
        }
        (CallAction::Start { .. }, Some(_)) => {
            Err(Rejection::new(format!("call {} already exists", call_id)))
        }
        (_, None) => Err(Rejection::new(format!("unknown call {}", call_id))),
        (CallAction::End, Some(index)) => {
            calls.remove(index);
            Ok(())
        }
        (CallAction::SetHeld { on_hold }, Some(index)) => {
            calls[index].state.is_on_hold = *on_hold;
            Ok(())
        }
        (CallAction::SetMuted { .. }, Some(_)) => Ok(()),
    }
}

#[async_trait]
impl AuthorityGateway for MemoryAuthority {
    async fn submit(&self, transaction: Transaction) -> Result<(), Rejection> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if transaction.is_empty() {
            return Err(Rejection::new("empty transaction"));
        }

        let rejections = self.rejections.read().await;
        let mut calls = self.calls.write().await;

        // Stage on a copy so a failing action leaves nothing applied
        let mut staged = calls.clone();
        for request in transaction.actions() {
            if let Some(reason) = rejections.get(&request.call_id) {
                debug!("Authority: refusing {}: {}", request, reason);
                return Err(Rejection::new(reason.clone()));
            }
            apply_action(&mut staged, request)?;
        }

        *calls = staged;
        debug!("Authority: applied transaction {}", transaction);
        Ok(())
    }

    async fn observed_calls(&self) -> Vec<ObservedCall> {
        self.calls
            .read()
            .await
            .iter()
            .map(|call| ObservedCall {
                call_id: call.id,
                state: call.state,
            })
            .collect()
    }

    async fn report_connected(&self, call_id: CallId) {
        let mut calls = self.calls.write().await;
        if let Some(call) = calls.iter_mut().find(|call| call.id == call_id) {
            call.state.has_connected = true;
        }
    }

    async fn report_incoming_call(
        &self,
        call_id: CallId,
        handle: Handle,
        _has_video: bool,
    ) -> Result<(), Rejection> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let rejections = self.rejections.read().await;
        if let Some(reason) = rejections.get(&call_id) {
            return Err(Rejection::new(reason.clone()));
        }

        let mut calls = self.calls.write().await;
        if calls.iter().any(|call| call.id == call_id) {
            return Err(Rejection::new(format!("call {} already exists", call_id)));
        }

        debug!("Authority: incoming call {} from {}", call_id, handle);
        calls.push(AuthorityCall::new(call_id, false));
        Ok(())
    }
}
