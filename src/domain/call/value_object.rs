//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Placed by the local user
    Outgoing,
    /// Reported to us by the authority
    Incoming,
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Outgoing call, start request not yet accepted
    Dialing,
    /// Remote party is being alerted
    Ringing,
    /// Accepted by the authority, waiting for the connected report
    Connecting,
    /// Connected and media is flowing
    Active,
    /// Connected but on hold
    Held,
    /// Terminal
    Ended,
}

impl CallStatus {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;

        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,

            (Dialing, Connecting) | (Dialing, Ringing) => true,
            (Ringing, Connecting) | (Ringing, Active) => true,
            (Connecting, Active) => true,
            (Active, Held) | (Held, Active) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "dialing",
            CallStatus::Ringing => "ringing",
            CallStatus::Connecting => "connecting",
            CallStatus::Active => "active",
            CallStatus::Held => "held",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of remote handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    #[serde(rename = "number")]
    PhoneNumber,
    #[serde(rename = "email")]
    EmailAddress,
    #[default]
    #[serde(rename = "generic")]
    Generic,
}

impl HandleKind {
    /// Decode the loosely-typed `handleType` field; unknown values fall back to generic.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("number") => HandleKind::PhoneNumber,
            Some("email") => HandleKind::EmailAddress,
            _ => HandleKind::Generic,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            HandleKind::PhoneNumber => "number",
            HandleKind::EmailAddress => "email",
            HandleKind::Generic => "generic",
        }
    }
}

/// Remote party handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    kind: HandleKind,
    value: String,
}

impl Handle {
    pub fn new(kind: HandleKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn phone_number(value: impl Into<String>) -> Self {
        Self::new(HandleKind::PhoneNumber, value)
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new(HandleKind::EmailAddress, value)
    }

    pub fn generic(value: impl Into<String>) -> Self {
        Self::new(HandleKind::Generic, value)
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_wire(), self.value)
    }
}
