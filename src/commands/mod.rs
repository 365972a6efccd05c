//! Command implementations

pub mod probe;
pub mod read;
pub mod write;
