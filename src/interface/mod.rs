//! Interface layer - entry points for the host application
//!
//! This layer handles:
//! - Decoding key-value commands into typed requests
//! - Formatting registry results back into key-value responses

pub mod command;
