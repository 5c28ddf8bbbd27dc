//! Call-control events

use std::fmt;
use std::time::Instant;

use crate::leg::LegId;
use crate::message::{Header, MaxForwardsHeader, SipAddress};
use crate::sdp::MsgBody;

/// Kind-specific event payload
#[derive(Debug, Clone, PartialEq)]
pub enum CallEventKind {
    /// Session answered (or renegotiation answered)
    Connect {
        code: u16,
        reason_phrase: String,
        body: Option<MsgBody>,
    },
    /// Tear the call down, optionally redirecting the peer
    Disconnect { redirect: Option<SipAddress> },
    /// Redirect response received for the call
    Redirect {
        code: u16,
        reason_phrase: String,
        redirect: Option<SipAddress>,
    },
    /// Failure to be reported or acted on
    Fail { code: u16, reason_phrase: String },
    /// New session description (re-INVITE)
    Update {
        body: Option<MsgBody>,
        max_forwards: Option<MaxForwardsHeader>,
    },
    /// Mid-call INFO payload
    Info { body: Option<MsgBody> },
}

/// An immutable call-control event
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub kind: CallEventKind,
    /// When the triggering message or action was received
    pub rtime: Instant,
    /// Which side or component produced the event
    pub origin: String,
    /// Reason header text
    pub reason: Option<String>,
    /// Warning text (e.g. why a body was rejected)
    pub warning: Option<String>,
    /// Headers to copy onto requests generated for this event
    pub extra_headers: Vec<Header>,
}

impl CallEvent {
    pub fn new(kind: CallEventKind, rtime: Instant, origin: impl Into<String>) -> Self {
        Self {
            kind,
            rtime,
            origin: origin.into(),
            reason: None,
            warning: None,
            extra_headers: Vec::new(),
        }
    }

    pub fn connect(
        code: u16,
        reason_phrase: impl Into<String>,
        body: Option<MsgBody>,
        rtime: Instant,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(
            CallEventKind::Connect {
                code,
                reason_phrase: reason_phrase.into(),
                body,
            },
            rtime,
            origin,
        )
    }

    pub fn disconnect(redirect: Option<SipAddress>, rtime: Instant, origin: impl Into<String>) -> Self {
        Self::new(CallEventKind::Disconnect { redirect }, rtime, origin)
    }

    pub fn redirect(
        code: u16,
        reason_phrase: impl Into<String>,
        redirect: Option<SipAddress>,
        rtime: Instant,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(
            CallEventKind::Redirect {
                code,
                reason_phrase: reason_phrase.into(),
                redirect,
            },
            rtime,
            origin,
        )
    }

    pub fn fail(code: u16, reason_phrase: impl Into<String>, rtime: Instant, origin: impl Into<String>) -> Self {
        Self::new(
            CallEventKind::Fail {
                code,
                reason_phrase: reason_phrase.into(),
            },
            rtime,
            origin,
        )
    }

    pub fn update(
        body: Option<MsgBody>,
        max_forwards: Option<MaxForwardsHeader>,
        rtime: Instant,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(CallEventKind::Update { body, max_forwards }, rtime, origin)
    }

    pub fn info(body: Option<MsgBody>, rtime: Instant, origin: impl Into<String>) -> Self {
        Self::new(CallEventKind::Info { body }, rtime, origin)
    }

    pub fn with_reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_extra_header(mut self, header: Header) -> Self {
        self.extra_headers.push(header);
        self
    }

    pub fn body(&self) -> Option<&MsgBody> {
        match &self.kind {
            CallEventKind::Connect { body, .. }
            | CallEventKind::Update { body, .. }
            | CallEventKind::Info { body } => body.as_ref(),
            _ => None,
        }
    }

    /// Replace the body of a Connect, Update or Info event
    pub fn set_body(&mut self, new_body: Option<MsgBody>) {
        match &mut self.kind {
            CallEventKind::Connect { body, .. }
            | CallEventKind::Update { body, .. }
            | CallEventKind::Info { body } => *body = new_body,
            _ => {}
        }
    }

    pub fn redirect_target(&self) -> Option<&SipAddress> {
        match &self.kind {
            CallEventKind::Disconnect { redirect } | CallEventKind::Redirect { redirect, .. } => {
                redirect.as_ref()
            }
            _ => None,
        }
    }

    /// Status code for Connect, Redirect and Fail events
    pub fn code(&self) -> Option<u16> {
        match &self.kind {
            CallEventKind::Connect { code, .. }
            | CallEventKind::Redirect { code, .. }
            | CallEventKind::Fail { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            CallEventKind::Connect { .. } => "Connect",
            CallEventKind::Disconnect { .. } => "Disconnect",
            CallEventKind::Redirect { .. } => "Redirect",
            CallEventKind::Fail { .. } => "Fail",
            CallEventKind::Update { .. } => "Update",
            CallEventKind::Info { .. } => "Info",
        }
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{}({}) from {}", self.name(), code, self.origin),
            None => write!(f, "{} from {}", self.name(), self.origin),
        }
    }
}

/// Event a leg hands to call control
#[derive(Debug, Clone, PartialEq)]
pub struct LegEvent {
    pub leg_id: LegId,
    pub event: CallEvent,
}
