//! The call leg
//!
//! A [`CallLeg`] is one established SIP dialog plus the state machine that
//! drives it. It is cheap to clone; every clone refers to the same leg.
//!
//! ```text
//!              recv_request / recv_ack          recv_event
//!  transaction ──────────────────────▶ CallLeg ◀────────────── call control
//!     layer   ◀────────────────────── (LegCore) ──────────────▶ (LegEvent rx)
//!              responses, requests       │      enqueued events
//!                                        ▼
//!                                    LegState
//! ```
//!
//! Inputs are serialized per leg: each entry point takes the leg lock, runs
//! the current state's handler, applies the transition and drains whatever
//! the handler queued for self-delivery before releasing the lock.

pub mod call_leg;
pub mod context;
pub mod dialog;
pub mod observer;
pub mod registry;

use std::fmt;

use uuid::Uuid;

pub use call_leg::{CallLeg, CallLegBuilder, LegSnapshot, WeakCallLeg};
pub use context::LegContext;
pub use dialog::LegDialog;
pub use observer::{LegObserver, NoopObserver};
pub use registry::LegRegistry;

/// Unique identifier of a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegId(pub Uuid);

impl LegId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LegId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
