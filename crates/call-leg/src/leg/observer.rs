//! Lifecycle callbacks

use std::time::Instant;

use super::LegId;

/// Receives leg lifecycle notifications.
///
/// Callbacks run while the leg is locked; they must not call back into the
/// same leg. All methods default to no-ops.
pub trait LegObserver: Send + Sync {
    /// The session is connected (ACK received, late-offer answer sent, or
    /// re-INVITE answered)
    fn on_connect(&self, _leg_id: &LegId, _rtime: Instant, _origin: &str) {}

    /// The leg entered Disconnected. `code` is the SIP status that ended the
    /// call, or 0 when it ended by BYE.
    fn on_disconnect(&self, _leg_id: &LegId, _rtime: Instant, _origin: &str, _code: u16) {}

    /// The leg is dead and can be released
    fn on_dead(&self, _leg_id: &LegId) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LegObserver for NoopObserver {}
