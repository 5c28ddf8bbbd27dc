//! SDP change hooks
//!
//! When a leg is about to adopt a new local or remote session description it
//! can hand the body to an application hook first (typically a media relay
//! that rewrites addresses and ports). The exchange is two-phase:
//!
//! ```text
//!   leg                       hook
//!    |-- on_change(change) ---->|
//!    |<-- Ready(body) ----------|   synchronous: continue immediately
//!    |<-- Deferred -------------|   suspended: leg backlogs further input
//!    |                          |
//!    |<-- CallLeg::complete_sdp_change(id, result)
//! ```
//!
//! A deferred change is recorded on the leg as a [`PendingSdpChange`]; the
//! continuation it stores runs as if it were a freshly delivered event.
//! The leg stays suspended until the change is completed, so every
//! `Deferred` reply must eventually be followed by `complete_sdp_change`.
//! While suspended, inbound requests beyond `LegConfig::max_backlog` are
//! answered 503.

use std::fmt;

use crate::errors::LegResult;
use crate::events::CallEvent;
use crate::leg::LegId;

use super::body::MsgBody;

/// Identifies one hook invocation on a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SdpChangeId(pub u64);

impl fmt::Display for SdpChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sdp-change-{}", self.0)
    }
}

/// Which side of the session produced the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpDirection {
    /// Body generated on our side, about to be sent
    Local,
    /// Body received from the peer
    Remote,
}

/// A body handed to a hook
#[derive(Debug, Clone)]
pub struct SdpChange {
    pub id: SdpChangeId,
    pub leg_id: LegId,
    pub direction: SdpDirection,
    pub body: MsgBody,
}

/// Hook answer
#[derive(Debug, Clone, PartialEq)]
pub enum SdpHookReply {
    /// Processed body available now
    Ready(MsgBody),
    /// Result will arrive through `CallLeg::complete_sdp_change`
    Deferred,
}

/// Application hook validating or rewriting a session description.
///
/// An `Err` return is treated as a malformed body: the leg reports a
/// `Fail(400, "Malformed SDP Body")` event carrying the error as warning.
pub trait SdpChangeHook: Send + Sync {
    fn on_change(&self, change: SdpChange) -> LegResult<SdpHookReply>;
}

impl<F> SdpChangeHook for F
where
    F: Fn(SdpChange) -> LegResult<SdpHookReply> + Send + Sync,
{
    fn on_change(&self, change: SdpChange) -> LegResult<SdpHookReply> {
        self(change)
    }
}

/// What the leg does once a hook has produced its body
#[derive(Debug, Clone)]
pub(crate) enum SdpContinuation {
    /// Deliver the event again, carrying the processed body
    Redeliver(CallEvent),
    /// Store the processed body as remote SDP, then hand the event to call control
    RemoteUpdate(CallEvent),
}

/// A hook invocation the leg is suspended on
#[derive(Debug, Clone)]
pub struct PendingSdpChange {
    pub id: SdpChangeId,
    pub direction: SdpDirection,
    pub(crate) continuation: SdpContinuation,
}
