//! Inbound command surface
//!
//! Decodes key-value requests coming from the host application into typed
//! commands and fulfils them against the call registry.

pub mod dto;
pub mod handler;

pub use dto::{CallData, CallIdData, EndOutcome, SetHeldData, SetMutedData};
pub use handler::{CallCommand, CommandError, CommandHandler};
