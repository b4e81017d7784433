//! Infrastructure layer - Technical implementations
//!
//! This layer contains adapters for the domain's authority port.

pub mod authority;
