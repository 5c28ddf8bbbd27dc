//! Session description handling
//!
//! The leg treats SDP almost opaquely: it stores local and remote snapshots,
//! compares them textually, and rewrites the connection address of a parsed
//! [`SdpSession`] when it fakes a hold offer. Anything beyond that (codec
//! negotiation, media ports) is left to the [`SdpChangeHook`]s the
//! application registers.

pub mod body;
pub mod hooks;

pub use body::{set_connection_address, MsgBody, HOLD_ADDRESS, SDP_CONTENT_TYPE};
pub use hooks::{PendingSdpChange, SdpChange, SdpChangeHook, SdpChangeId, SdpDirection, SdpHookReply};
pub use rvoip_sip_core::types::sdp::SdpSession;
