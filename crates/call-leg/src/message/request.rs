//! Request values

use std::time::Instant;

use super::headers::{AddressHeader, Header, MaxForwardsHeader};
use super::method::Method;
use super::response::Response;
use crate::sdp::MsgBody;

/// A SIP request as seen by the leg
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Request-URI
    pub uri: String,
    pub call_id: String,
    pub cseq: u32,
    pub headers: Vec<Header>,
    pub body: Option<MsgBody>,
    /// Receive (or creation) time
    pub rtime: Instant,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            call_id: String::new(),
            cseq: 0,
            headers: Vec::new(),
            body: None,
            rtime: Instant::now(),
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    pub fn with_cseq(mut self, cseq: u32) -> Self {
        self.cseq = cseq;
        self
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.append_header(header);
        self
    }

    pub fn with_body(mut self, body: MsgBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_rtime(mut self, rtime: Instant) -> Self {
        self.rtime = rtime;
        self
    }

    pub fn append_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Replace every header with the same name, then append
    pub fn set_header(&mut self, header: Header) {
        let name = header.name().to_string();
        self.headers.retain(|h| !h.name().eq_ignore_ascii_case(&name));
        self.headers.push(header);
    }

    pub fn set_body(&mut self, body: Option<MsgBody>) {
        self.body = body;
    }

    pub fn refer_to(&self) -> Option<&AddressHeader> {
        self.headers.iter().find_map(|h| match h {
            Header::ReferTo(a) => Some(a),
            _ => None,
        })
    }

    pub fn referred_by(&self) -> Option<&AddressHeader> {
        self.headers.iter().find_map(|h| match h {
            Header::ReferredBy(a) => Some(a),
            _ => None,
        })
    }

    /// All Also headers, in order
    pub fn also(&self) -> Vec<&AddressHeader> {
        self.headers
            .iter()
            .filter_map(|h| match h {
                Header::Also(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn max_forwards(&self) -> Option<&MaxForwardsHeader> {
        self.headers.iter().find_map(|h| match h {
            Header::MaxForwards(m) => Some(m),
            _ => None,
        })
    }

    pub fn reason(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            Header::Reason(r) => Some(r.as_str()),
            _ => None,
        })
    }

    /// Build a response to this request
    pub fn gen_response(
        &self,
        code: u16,
        reason: &str,
        body: Option<MsgBody>,
        server: Option<&str>,
    ) -> Response {
        Response {
            code,
            reason: reason.to_string(),
            method: self.method.clone(),
            call_id: self.call_id.clone(),
            cseq: self.cseq,
            headers: Vec::new(),
            body,
            server: server.map(str::to_string),
            rtime: Instant::now(),
        }
    }
}
