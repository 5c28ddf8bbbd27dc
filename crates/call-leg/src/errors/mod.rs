//! Error types for call-leg
//!
//! Every error in this crate is scoped to a single leg: it aborts the
//! transition that produced it and is logged, it never reaches the transport
//! layer and never affects other legs.

pub mod leg_errors;

// Re-export main error types
pub use leg_errors::{LegError, LegResult};
