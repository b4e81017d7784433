//! Call registry
//!
//! Owns every live [`Call`], submits actions to the authority one at a time
//! per call, reconciles the outcome back into call state and broadcasts a
//! payload-free [`CallsChanged`] after every mutation. Readers only ever get
//! snapshots.

use crate::domain::action::{ActionRequest, Transaction};
use crate::domain::authority::{AuthorityEvent, AuthorityGateway, Rejection};
use crate::domain::call::{Call, CallSnapshot, CallView, Handle};
use crate::domain::shared::error::CallError;
use crate::domain::shared::events::DomainEvent;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause before a deferred connected report retries a busy call
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// "Something in the registry changed"; observers re-query for details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallsChanged;

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Delay between an accepted start and the connected report
    pub connect_report_delay: Duration,
    /// Buffered notifications per subscriber before it lags
    pub notification_capacity: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            connect_report_delay: Duration::from_millis(1000),
            notification_capacity: 64,
        }
    }
}

/// Description of a call to start or to report as incoming
#[derive(Debug, Clone)]
pub struct CallSpec {
    /// Generated when absent
    pub id: Option<CallId>,
    pub handle: Handle,
    pub caller_name: Option<String>,
    pub has_video: bool,
}

impl CallSpec {
    pub fn new(handle: Handle) -> Self {
        Self {
            id: None,
            handle,
            caller_name: None,
            has_video: false,
        }
    }

    pub fn with_id(mut self, id: CallId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_name = Some(name.into());
        self
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }
}

#[derive(Default)]
struct RegistryState {
    /// Insertion ordered
    calls: Vec<Call>,
    /// Calls with an outstanding authority request
    in_flight: HashSet<CallId>,
}

impl RegistryState {
    fn position(&self, call_id: CallId) -> Option<usize> {
        self.calls.iter().position(|call| call.id() == call_id)
    }

    fn get(&self, call_id: CallId) -> Option<&Call> {
        self.calls.iter().find(|call| call.id() == call_id)
    }

    fn get_mut(&mut self, call_id: CallId) -> Option<&mut Call> {
        self.calls.iter_mut().find(|call| call.id() == call_id)
    }

    fn require(&self, call_id: CallId) -> Result<&Call> {
        self.get(call_id).ok_or(CallError::NotFound(call_id))
    }
}

struct RegistryInner {
    gateway: Arc<dyn AuthorityGateway>,
    state: Mutex<RegistryState>,
    changes: broadcast::Sender<CallsChanged>,
    options: RegistryOptions,
}

/// Exclusive claim on a call while one authority request is outstanding.
/// Released on drop, so an aborted submission never leaves the call stuck.
struct InFlight {
    inner: Arc<RegistryInner>,
    call_id: CallId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.state.lock().in_flight.remove(&self.call_id);
    }
}

/// Handle to the call registry. Clones share the same registry.
#[derive(Clone)]
pub struct CallRegistry {
    inner: Arc<RegistryInner>,
}

impl CallRegistry {
    pub fn new(gateway: Arc<dyn AuthorityGateway>, options: RegistryOptions) -> Self {
        let (changes, _) = broadcast::channel(options.notification_capacity.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                gateway,
                state: Mutex::new(RegistryState::default()),
                changes,
                options,
            }),
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CallsChanged> {
        self.inner.changes.subscribe()
    }

    // ---- queries

    /// Exact-match lookup
    pub fn lookup(&self, call_id: CallId) -> Option<CallSnapshot> {
        self.inner.state.lock().get(call_id).map(Call::snapshot)
    }

    /// All registry calls in insertion order
    pub fn calls(&self) -> Vec<CallSnapshot> {
        self.inner.state.lock().calls.iter().map(Call::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One view per call the authority currently observes.
    ///
    /// Calls the registry does not hold are returned as identifier-only views.
    pub async fn active_calls_snapshot(&self) -> Vec<CallView> {
        let observed = self.inner.gateway.observed_calls().await;
        let state = self.inner.state.lock();

        observed
            .into_iter()
            .map(|observed| match state.get(observed.call_id) {
                Some(call) => CallView::Known(call.snapshot()),
                None => CallView::Unknown {
                    id: observed.call_id,
                },
            })
            .collect()
    }

    // ---- actions

    /// Ask the authority to start an outgoing call.
    ///
    /// On acceptance the call enters the registry as `Connecting` and a
    /// connected report is scheduled after `connect_report_delay`.
    pub async fn start_call(&self, spec: CallSpec) -> Result<CallSnapshot> {
        let call_id = spec.id.unwrap_or_default();
        let claim = self.claim(call_id, |state| match state.get(call_id) {
            Some(_) => Err(CallError::AlreadyExists(call_id)),
            None => Ok(()),
        })?;

        info!("Starting call {} to {}", call_id, spec.handle);
        let transaction = Transaction::single(ActionRequest::start(
            call_id,
            spec.handle.clone(),
            spec.has_video,
        ));

        self.run_exclusive(claim, "start", self.submission(transaction), move |registry| {
            let mut call = Call::outgoing(call_id, spec.handle, spec.caller_name, spec.has_video);
            call.start_connecting()?;
            let snapshot = call.snapshot();
            registry.add_call(call)?;
            registry.schedule_connected_report(call_id);
            Ok(snapshot)
        })
        .await
    }

    /// Announce an incoming call; on acceptance it enters the registry as `Ringing`
    pub async fn report_incoming_call(&self, spec: CallSpec) -> Result<CallSnapshot> {
        let call_id = spec.id.unwrap_or_default();
        let claim = self.claim(call_id, |state| match state.get(call_id) {
            Some(_) => Err(CallError::AlreadyExists(call_id)),
            None => Ok(()),
        })?;

        info!("Reporting incoming call {} from {}", call_id, spec.handle);
        let gateway = Arc::clone(&self.inner.gateway);
        let handle = spec.handle.clone();
        let has_video = spec.has_video;
        let request = async move { gateway.report_incoming_call(call_id, handle, has_video).await };

        self.run_exclusive(claim, "incoming", request, move |registry| {
            let call = Call::incoming(call_id, spec.handle, spec.caller_name, spec.has_video);
            let snapshot = call.snapshot();
            registry.add_call(call)?;
            Ok(snapshot)
        })
        .await
    }

    /// Report the call connected to the authority now and mark it `Active`.
    ///
    /// Fails without contacting the authority when the call is gone, cannot
    /// connect, or has another action in flight.
    pub async fn connect_call(&self, call_id: CallId) -> Result<()> {
        let claim = self.claim(call_id, |state| state.require(call_id)?.check_connect())?;

        let gateway = Arc::clone(&self.inner.gateway);
        let request = async move {
            gateway.report_connected(call_id).await;
            Ok::<(), Rejection>(())
        };

        self.run_exclusive(claim, "connect", request, move |registry| {
            registry.mutate(|state| {
                let call = state.get_mut(call_id).ok_or(CallError::NotFound(call_id))?;
                call.connect()?;
                Ok(((), drain_events(call)))
            })
        })
        .await
    }

    /// End a call the registry holds
    pub async fn request_end(&self, call_id: CallId) -> Result<()> {
        let claim = self.claim(call_id, |state| state.require(call_id)?.check_end())?;
        self.submit_end(claim, call_id).await
    }

    /// End every call the authority observes, each in its own submission.
    ///
    /// Outcomes are reported per call; one failure does not affect the others.
    pub async fn request_end_all(&self) -> Vec<(CallId, Result<()>)> {
        let observed = self.inner.gateway.observed_calls().await;
        info!("Ending {} calls observed by the authority", observed.len());

        let requests = observed.into_iter().map(|observed| {
            let call_id = observed.call_id;
            async move {
                let claim = self.claim(call_id, |state| match state.get(call_id) {
                    Some(call) => call.check_end(),
                    None => Ok(()),
                });
                let outcome = match claim {
                    Ok(claim) => self.submit_end(claim, call_id).await,
                    Err(e) => Err(e),
                };
                (call_id, outcome)
            }
        });

        let outcomes = join_all(requests).await;
        for (call_id, outcome) in &outcomes {
            if let Err(e) = outcome {
                warn!("Failed to end call {}: {}", call_id, e);
            }
        }
        outcomes
    }

    pub async fn request_set_mute(&self, call_id: CallId, muted: bool) -> Result<()> {
        let claim = self.claim(call_id, |state| state.require(call_id)?.check_mute())?;

        info!("Requesting mute={} on call {}", muted, call_id);
        let transaction = Transaction::single(ActionRequest::set_muted(call_id, muted));

        self.run_exclusive(claim, "set_muted", self.submission(transaction), move |registry| {
            registry.mutate(|state| {
                let call = state.get_mut(call_id).ok_or(CallError::NotFound(call_id))?;
                call.set_muted(muted)?;
                Ok(((), drain_events(call)))
            })
        })
        .await
    }

    pub async fn request_set_hold(&self, call_id: CallId, on_hold: bool) -> Result<()> {
        let claim = self.claim(call_id, |state| state.require(call_id)?.check_hold(on_hold))?;

        info!("Requesting hold={} on call {}", on_hold, call_id);
        let transaction = Transaction::single(ActionRequest::set_held(call_id, on_hold));

        self.run_exclusive(claim, "set_held", self.submission(transaction), move |registry| {
            registry.mutate(|state| {
                let call = state.get_mut(call_id).ok_or(CallError::NotFound(call_id))?;
                call.set_held(on_hold)?;
                Ok(((), drain_events(call)))
            })
        })
        .await
    }

    // ---- authority-side reconciliation

    /// Apply an event the authority raised on its own.
    ///
    /// Duplicate or stale events are ignored. Returns whether anything changed.
    pub fn handle_authority_event(&self, event: AuthorityEvent) -> bool {
        debug!("Authority event {:?}", event);
        match event {
            AuthorityEvent::Connected(call_id) => {
                let outcome = self.mutate(|state| match state.get_mut(call_id) {
                    Some(call) if call.check_connect().is_ok() => {
                        call.connect()?;
                        Ok((true, drain_events(call)))
                    }
                    _ => Ok((false, 0)),
                });
                match outcome {
                    Ok(changed) => changed,
                    Err(e) => {
                        warn!("Could not apply connected report for call {}: {}", call_id, e);
                        false
                    }
                }
            }
            AuthorityEvent::Ended(call_id) => self.finish_end(call_id),
        }
    }

    /// Apply authority events until the stream closes
    pub fn follow(&self, mut events: broadcast::Receiver<AuthorityEvent>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        registry.handle_authority_event(event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} authority events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Authority event stream closed");
        })
    }

    // ---- registry primitives

    /// Insert a call. Notifies once. Ended calls are refused.
    pub fn add_call(&self, mut call: Call) -> Result<()> {
        check_not_ended(&call)?;
        self.mutate(|state| {
            if state.get(call.id()).is_some() {
                return Err(CallError::AlreadyExists(call.id()));
            }
            // Transitions before insertion were never observable
            call.take_events();
            debug!("Added call {} ({})", call.id(), call.status());
            state.calls.push(call);
            Ok(((), 1))
        })
    }

    /// Replace the call with the same identifier in place.
    ///
    /// Unknown identifiers are a no-op and do not notify. Calls with an
    /// action in flight are `Busy`; ended calls are refused.
    pub fn update_call(&self, mut call: Call) -> Result<bool> {
        check_not_ended(&call)?;
        let call_id = call.id();
        self.mutate(|state| {
            if state.in_flight.contains(&call_id) {
                return Err(CallError::Busy(call_id));
            }
            match state.position(call_id) {
                Some(index) => {
                    call.take_events();
                    state.calls[index] = call;
                    Ok((true, 1))
                }
                None => Ok((false, 0)),
            }
        })
    }

    /// Remove a call by identifier.
    ///
    /// Removing a call that is not present is a no-op and does not notify.
    /// Calls with an action in flight are `Busy`.
    pub fn remove_call(&self, call_id: CallId) -> Result<Option<CallSnapshot>> {
        self.mutate(|state| {
            if state.in_flight.contains(&call_id) {
                return Err(CallError::Busy(call_id));
            }
            match state.position(call_id) {
                Some(index) => {
                    let call = state.calls.remove(index);
                    debug!("Removed call {}", call_id);
                    Ok((Some(call.snapshot()), 1))
                }
                None => Ok((None, 0)),
            }
        })
    }

    /// Drop every call. Always notifies once, even when already empty.
    ///
    /// Outstanding actions still complete against the authority, but their
    /// callers get `NotFound` since the call is no longer held.
    pub fn remove_all_calls(&self) -> usize {
        let outcome = self.mutate(|state| {
            let removed = state.calls.len();
            state.calls.clear();
            Ok((removed, 1))
        });
        let removed = outcome.unwrap_or(0);
        info!("Cleared {} calls from registry", removed);
        removed
    }

    // ---- internals

    /// Reserve `call_id` for one outstanding request after `check` passes
    fn claim<F>(&self, call_id: CallId, check: F) -> Result<InFlight>
    where
        F: FnOnce(&RegistryState) -> Result<()>,
    {
        let mut state = self.inner.state.lock();
        if state.in_flight.contains(&call_id) {
            debug!("Call {} busy, rejecting concurrent action", call_id);
            return Err(CallError::Busy(call_id));
        }
        check(&state)?;
        state.in_flight.insert(call_id);

        Ok(InFlight {
            inner: Arc::clone(&self.inner),
            call_id,
        })
    }

    fn submission(
        &self,
        transaction: Transaction,
    ) -> impl Future<Output = std::result::Result<(), Rejection>> + Send + 'static {
        let gateway = Arc::clone(&self.inner.gateway);
        async move {
            debug!("Submitting transaction {} {}", transaction.id(), transaction);
            gateway.submit(transaction).await
        }
    }

    /// Run `request` against the authority and, if accepted, `apply` its effect.
    ///
    /// Runs on its own task so the reconciliation completes and the claim is
    /// released even if the caller stops waiting.
    async fn run_exclusive<T, R, F>(
        &self,
        claim: InFlight,
        label: &'static str,
        request: R,
        apply: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        R: Future<Output = std::result::Result<(), Rejection>> + Send + 'static,
        F: FnOnce(&CallRegistry) -> Result<T> + Send + 'static,
    {
        let registry = self.clone();
        let call_id = claim.call_id;
        counter!("callkeep_submissions_total", "action" => label).increment(1);

        let task = tokio::spawn(async move {
            let _claim = claim;
            if let Err(rejection) = request.await {
                warn!("Authority rejected {} for call {}: {}", label, call_id, rejection);
                counter!("callkeep_rejections_total", "action" => label).increment(1);
                return Err(CallError::AuthorityRejected(rejection.reason));
            }
            debug!("Authority accepted {} for call {}", label, call_id);
            apply(&registry)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(CallError::Internal(format!(
                "{} task for call {} failed: {}",
                label, call_id, e
            ))),
        }
    }

    async fn submit_end(&self, claim: InFlight, call_id: CallId) -> Result<()> {
        info!("Requesting end of call {}", call_id);
        let transaction = Transaction::single(ActionRequest::end(call_id));

        self.run_exclusive(claim, "end", self.submission(transaction), move |registry| {
            registry.finish_end(call_id);
            Ok(())
        })
        .await
    }

    /// End and remove a call; no-op when it is already gone
    fn finish_end(&self, call_id: CallId) -> bool {
        let outcome = self.mutate(|state| {
            let Some(index) = state.position(call_id) else {
                return Ok((false, 0));
            };
            // End in place so a failed transition leaves the call where it was
            state.calls[index].end()?;
            let mut call = state.calls.remove(index);
            info!("Call {} ended", call_id);
            // The status change plus the removal itself
            Ok((true, drain_events(&mut call) + 1))
        });

        match outcome {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Could not end call {}: {}", call_id, e);
                false
            }
        }
    }

    fn schedule_connected_report(&self, call_id: CallId) {
        let registry = self.clone();
        let delay = self.inner.options.connect_report_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            loop {
                match registry.connect_call(call_id).await {
                    Ok(()) => info!("Call {} connected", call_id),
                    Err(CallError::Busy(_)) => {
                        debug!("Call {} busy, retrying connected report", call_id);
                        tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                        continue;
                    }
                    Err(e) => debug!("Dropping stale connected report for call {}: {}", call_id, e),
                }
                break;
            }
        });
    }

    /// Mutate state under the lock, then publish `notifications` changes after releasing it
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryState) -> Result<(T, usize)>,
    {
        let (value, notifications, len) = {
            let mut state = self.inner.state.lock();
            let (value, notifications) = f(&mut state)?;
            (value, notifications, state.calls.len())
        };

        gauge!("callkeep_registry_calls").set(len as f64);
        self.publish(notifications);
        Ok(value)
    }

    fn publish(&self, notifications: usize) {
        for _ in 0..notifications {
            if self.inner.changes.send(CallsChanged).is_err() {
                debug!("No observers for calls-changed notification");
                break;
            }
        }
    }
}

fn check_not_ended(call: &Call) -> Result<()> {
    if call.status().is_terminal() {
        return Err(CallError::InvalidTransition(format!(
            "Call {} has already ended",
            call.id()
        )));
    }
    Ok(())
}

fn drain_events(call: &mut Call) -> usize {
    let events = call.take_events();
    for event in &events {
        debug!("{} {}", event.event_type(), event.call_id);
    }
    events.len()
}
