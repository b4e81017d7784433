//! callkeep - call-session registry kept in step with a telephony authority
//!
//! Layered like a small DDD service:
//! - `domain`: the call aggregate, action requests, the authority port and
//!   the registry that arbitrates between them
//! - `infrastructure`: authority adapters
//! - `interface`: the key-value command surface for host applications

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::call_registry::{CallRegistry, CallSpec, CallsChanged, RegistryOptions};
pub use domain::shared::error::CallError;
pub use domain::shared::result::Result;
