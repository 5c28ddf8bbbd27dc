//! # RVoIP Call Leg
//!
//! Per-call signaling state machine for an established SIP dialog, as used by
//! a B2BUA or softswitch to drive each side of a call.
//!
//! ## Features
//!
//! - **In-dialog requests**: re-INVITE (including body-less hold), BYE with
//!   Also, REFER, INFO, OPTIONS and UPDATE
//! - **Call-control events**: disconnect, transfer, re-offer and INFO
//!   instructions translated into in-dialog requests
//! - **Offer/answer**: glare handling (491), late offers and deferred ACKs
//! - **SDP hooks**: synchronous or deferred rewriting of local and remote
//!   session descriptions, with input backlogged while a hook is pending
//! - **Timers**: ACK expiry, credit limit, OPTIONS keepalive, disconnect linger
//!
//! ## Architecture
//!
//! - `leg`: the [`CallLeg`] handle, its builder, dialog data and registry
//! - `state`: Connected, Updating (UAC/UAS), Disconnected and Dead states
//! - `events`: call-control event model
//! - `transaction`: traits the transaction layer implements
//! - `timer`: timer scheduling abstraction
//! - `sdp`: message bodies and SDP change hooks
//! - `message`: request/response values and the headers the leg uses
//! - `config`, `errors`, `logging`: ambient support
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_call_leg::prelude::*;
//!
//! # async fn example(transactions: Arc<dyn TransactionLayer>) -> LegResult<()> {
//! let dialog = LegDialog::new(
//!     "a84b4c76e66710@pc33.example.com",
//!     "sip:b2bua@example.com".parse::<SipAddress>()?.with_param("tag", Some("1928301774")),
//!     "sip:bob@example.net".parse::<SipAddress>()?.with_param("tag", Some("a6c85cf")),
//!     "sip:bob@192.0.2.4",
//! );
//! let (leg, mut events) = CallLeg::builder(dialog, transactions)
//!     .with_config(LegConfig::default().with_refer_transfer())
//!     .with_origin("callee")
//!     .build()?;
//!
//! leg.disconnect("caller").await;
//! while let Some(LegEvent { event, .. }) = events.recv().await {
//!     println!("call control got {}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod leg;
pub mod logging;
pub mod message;
pub mod sdp;
pub mod state;
pub mod timer;
pub mod transaction;

pub use config::LegConfig;
pub use errors::{LegError, LegResult};
pub use events::{CallEvent, CallEventKind, LegEvent};
pub use leg::{CallLeg, CallLegBuilder, LegDialog, LegId, LegObserver, LegRegistry, LegSnapshot};

/// Commonly used types
pub mod prelude {
    pub use crate::config::LegConfig;
    pub use crate::errors::{LegError, LegResult};
    pub use crate::events::{CallEvent, CallEventKind, LegEvent};
    pub use crate::leg::{
        CallLeg, CallLegBuilder, LegDialog, LegId, LegObserver, LegRegistry, LegSnapshot, NoopObserver,
    };
    pub use crate::message::{Header, Method, Request, Response, SipAddress};
    pub use crate::sdp::{MsgBody, SdpChange, SdpChangeHook, SdpChangeId, SdpDirection, SdpHookReply};
    pub use crate::timer::{TimerHandle, TimerKind, TimerScheduler, TokioTimerScheduler};
    pub use crate::transaction::{ClientTransaction, ResponseHandler, ServerTransaction, TransactionLayer};
}
