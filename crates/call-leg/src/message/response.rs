//! Response values

use std::time::Instant;

use super::headers::Header;
use super::method::Method;
use crate::sdp::MsgBody;

/// A SIP response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: u16,
    pub reason: String,
    /// Method of the request this responds to (from CSeq)
    pub method: Method,
    pub call_id: String,
    pub cseq: u32,
    pub headers: Vec<Header>,
    pub body: Option<MsgBody>,
    /// Server identity header
    pub server: Option<String>,
    pub rtime: Instant,
}

impl Response {
    /// Response to `method`, used by transaction layers delivering outcomes
    pub fn new(code: u16, reason: impl Into<String>, method: Method) -> Self {
        Self {
            code,
            reason: reason.into(),
            method,
            call_id: String::new(),
            cseq: 0,
            headers: Vec::new(),
            body: None,
            server: None,
            rtime: Instant::now(),
        }
    }

    pub fn with_body(mut self, body: MsgBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_rtime(mut self, rtime: Instant) -> Self {
        self.rtime = rtime;
        self
    }

    pub fn is_provisional(&self) -> bool {
        self.code < 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}
