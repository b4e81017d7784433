//! Domain layer - core call-session model and rules
//!
//! This layer contains:
//! - The `Call` aggregate and its state machine
//! - Action requests submitted to the telephony authority
//! - The authority port (trait) implemented by infrastructure adapters
//! - The call registry that arbitrates submission and reconciliation

pub mod action;
pub mod authority;
pub mod call;
pub mod call_registry;
pub mod shared;

// Re-export commonly used types
pub use shared::{CallError, Result};
