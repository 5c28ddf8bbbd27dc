//! Call-control event model
//!
//! - [`CallEvent`]: an instruction for a leg (or a report from one), stamped
//!   with its receive time and origin
//! - [`CallEventKind`]: the closed set of event kinds
//! - [`LegEvent`]: envelope used when a leg hands an event to call control

pub mod call_event;

pub use call_event::{CallEvent, CallEventKind, LegEvent};
