//! Call aggregate root

use crate::domain::call::event::{CallChange, CallEvent};
use crate::domain::call::value_object::{CallDirection, CallStatus, Handle};
use crate::domain::call::view::CallSnapshot;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};

/// Call aggregate root
///
/// The registry's local mirror of one telephony session. Every mutation
/// goes through a transition method that validates the move and records a
/// [`CallEvent`]; the owner drains those events to notify observers.
#[derive(Debug, Clone)]
pub struct Call {
    id: CallId,
    handle: Handle,
    caller_name: Option<String>,
    has_video: bool,
    direction: CallDirection,
    status: CallStatus,
    muted: bool,
    started_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    /// Pending domain events
    events: Vec<CallEvent>,
}

impl Call {
    fn new(
        id: CallId,
        handle: Handle,
        caller_name: Option<String>,
        has_video: bool,
        direction: CallDirection,
        status: CallStatus,
    ) -> Self {
        Self {
            id,
            handle,
            caller_name,
            has_video,
            direction,
            status,
            muted: false,
            started_at: Utc::now(),
            connected_at: None,
            events: Vec::new(),
        }
    }

    /// Create an outgoing call in `Dialing`
    pub fn outgoing(id: CallId, handle: Handle, caller_name: Option<String>, has_video: bool) -> Self {
        Self::new(id, handle, caller_name, has_video, CallDirection::Outgoing, CallStatus::Dialing)
    }

    /// Create an incoming call in `Ringing`
    pub fn incoming(id: CallId, handle: Handle, caller_name: Option<String>, has_video: bool) -> Self {
        Self::new(id, handle, caller_name, has_video, CallDirection::Incoming, CallStatus::Ringing)
    }

    /// Start request accepted by the authority
    pub fn start_connecting(&mut self) -> Result<()> {
        self.transition_to(CallStatus::Connecting)
    }

    /// Only ringing or connecting calls can be reported connected
    pub fn check_connect(&self) -> Result<()> {
        if !matches!(self.status, CallStatus::Ringing | CallStatus::Connecting) {
            return Err(CallError::InvalidTransition(format!(
                "Cannot connect call {} while {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Authority reported the call connected
    pub fn connect(&mut self) -> Result<()> {
        self.check_connect()?;
        self.transition_to(CallStatus::Active)?;
        self.connected_at = Some(Utc::now());
        Ok(())
    }

    /// Check whether `set_held(on_hold)` would be accepted, without mutating
    pub fn check_hold(&self, on_hold: bool) -> Result<()> {
        let (from, to) = if on_hold {
            (CallStatus::Active, CallStatus::Held)
        } else {
            (CallStatus::Held, CallStatus::Active)
        };

        if self.status != from {
            return Err(CallError::InvalidTransition(format!(
                "Cannot move call {} from {} to {}",
                self.id, self.status, to
            )));
        }

        Ok(())
    }

    pub fn set_held(&mut self, on_hold: bool) -> Result<()> {
        self.check_hold(on_hold)?;
        self.transition_to(if on_hold { CallStatus::Held } else { CallStatus::Active })
    }

    pub fn check_mute(&self) -> Result<()> {
        self.check_live("change mute on")
    }

    /// Update the mute flag; setting the current value records nothing
    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.check_mute()?;
        if self.muted != muted {
            self.muted = muted;
            self.record_event(CallChange::Muted { muted });
        }
        Ok(())
    }

    pub fn check_end(&self) -> Result<()> {
        self.check_live("end")
    }

    /// End the call
    pub fn end(&mut self) -> Result<()> {
        self.transition_to(CallStatus::Ended)
    }

    fn check_live(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CallError::InvalidTransition(format!(
                "Cannot {} ended call {}",
                action, self.id
            )));
        }
        Ok(())
    }

    /// Transition to a new state
    fn transition_to(&mut self, next: CallStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CallError::InvalidTransition(format!(
                "Cannot transition call {} from {} to {}",
                self.id, self.status, next
            )));
        }

        let from = self.status;
        self.status = next;
        self.record_event(CallChange::Status { from, to: next });
        Ok(())
    }

    fn record_event(&mut self, change: CallChange) {
        self.events.push(CallEvent::new(self.id, change));
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    /// Immutable view handed to readers outside the registry
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            id: self.id,
            caller_name: self.caller_name.clone(),
            handle: self.handle.value().to_string(),
            handle_type: self.handle.kind(),
            has_video: self.has_video,
            is_outgoing: self.direction == CallDirection::Outgoing,
            status: self.status,
            is_muted: self.muted,
            is_on_hold: self.is_on_hold(),
            started_at: self.started_at,
            connected_at: self.connected_at,
        }
    }

    // Getters
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Hold flag, derived from status so the two can never disagree
    pub fn is_on_hold(&self) -> bool {
        self.status == CallStatus::Held
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_call() -> Call {
        Call::outgoing(
            CallId::new(),
            Handle::phone_number("+15551234"),
            Some("Alice".to_string()),
            false,
        )
    }

    #[test]
    fn test_call_lifecycle() {
        let mut call = create_test_call();
        assert_eq!(call.status(), CallStatus::Dialing);
        assert!(call.take_events().is_empty());

        call.start_connecting().unwrap();
        assert_eq!(call.status(), CallStatus::Connecting);

        call.connect().unwrap();
        assert_eq!(call.status(), CallStatus::Active);
        assert!(call.connected_at().is_some());

        call.set_held(true).unwrap();
        assert!(call.is_on_hold());
        // A late connected report must not take the call off hold
        assert!(call.connect().is_err());

        call.set_held(false).unwrap();
        assert!(!call.is_on_hold());
        assert_eq!(call.status(), CallStatus::Active);

        call.set_muted(true).unwrap();
        assert!(call.is_muted());

        call.end().unwrap();
        assert_eq!(call.status(), CallStatus::Ended);

        // Connecting, Active, Held, Active, Muted, Ended
        let events = call.take_events();
        assert_eq!(events.len(), 6);
        assert_eq!(
            events[2].change,
            CallChange::Status {
                from: CallStatus::Active,
                to: CallStatus::Held
            }
        );
    }

    #[test]
    fn test_incoming_call_enters_ringing() {
        let mut call = Call::incoming(CallId::new(), Handle::email("bob@example.com"), None, true);
        assert_eq!(call.status(), CallStatus::Ringing);
        assert_eq!(call.direction(), CallDirection::Incoming);

        call.connect().unwrap();
        assert_eq!(call.status(), CallStatus::Active);
    }

    #[test]
    fn test_hold_requires_active() {
        let mut call = create_test_call();
        call.start_connecting().unwrap();

        let result = call.set_held(true);
        assert!(matches!(result, Err(CallError::InvalidTransition(_))));
        assert_eq!(call.status(), CallStatus::Connecting);

        call.connect().unwrap();
        assert!(call.check_hold(false).is_err());
        assert!(call.check_hold(true).is_ok());
    }

    #[test]
    fn test_cannot_mutate_ended_call() {
        let mut call = create_test_call();
        call.end().unwrap();
        call.take_events();

        assert!(call.set_held(true).is_err());
        assert!(call.set_muted(true).is_err());
        assert!(call.end().is_err());
        assert!(call.connect().is_err());
        assert!(call.take_events().is_empty());
    }

    #[test]
    fn test_repeated_mute_records_once() {
        let mut call = create_test_call();
        call.set_muted(true).unwrap();
        call.set_muted(true).unwrap();
        assert_eq!(call.take_events().len(), 1);
    }

    #[test]
    fn test_snapshot_mirrors_call() {
        let mut call = create_test_call();
        call.start_connecting().unwrap();

        let snapshot = call.snapshot();
        assert_eq!(snapshot.id, call.id());
        assert_eq!(snapshot.handle, "+15551234");
        assert_eq!(snapshot.caller_name.as_deref(), Some("Alice"));
        assert_eq!(snapshot.status, CallStatus::Connecting);
        assert!(snapshot.is_outgoing);
        assert!(!snapshot.is_on_hold);
    }
}
