//! Authority gateway adapters

pub mod memory;

pub use memory::MemoryAuthority;
