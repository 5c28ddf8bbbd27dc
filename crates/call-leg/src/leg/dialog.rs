//! Dialog parameters and in-dialog request generation

use std::str::FromStr;

use rvoip_sip_core::types::uri::Uri;

use crate::errors::{LegError, LegResult};
use crate::message::{Header, Method, Request, SipAddress};
use crate::sdp::MsgBody;

/// Identifiers and sequence numbers of the dialog a leg runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegDialog {
    pub call_id: String,
    /// Our address (From on requests we send)
    pub local_uri: SipAddress,
    /// Peer address (To on requests we send)
    pub remote_uri: SipAddress,
    /// Request-URI for in-dialog requests (peer Contact)
    pub remote_target: String,
    /// CSeq the next generated request will carry
    pub local_cseq: u32,
    /// Highest CSeq seen from the peer
    pub remote_cseq: Option<u32>,
}

impl LegDialog {
    pub fn new(
        call_id: impl Into<String>,
        local_uri: SipAddress,
        remote_uri: SipAddress,
        remote_target: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            local_uri,
            remote_uri,
            remote_target: remote_target.into(),
            local_cseq: 1,
            remote_cseq: None,
        }
    }

    pub fn with_local_cseq(mut self, cseq: u32) -> Self {
        self.local_cseq = cseq;
        self
    }

    pub fn with_remote_cseq(mut self, cseq: u32) -> Self {
        self.remote_cseq = Some(cseq);
        self
    }

    /// Build an in-dialog request with the current local CSeq.
    ///
    /// `extra_headers` are appended in order, except Max-Forwards which
    /// replaces the default. The CSeq is not advanced; callers do that once
    /// the request is committed.
    pub fn gen_request(
        &self,
        method: Method,
        body: Option<MsgBody>,
        extra_headers: &[Header],
        max_forwards: u32,
    ) -> LegResult<Request> {
        if self.call_id.is_empty() {
            return Err(LegError::request_generation("dialog has no Call-ID"));
        }
        if let Err(e) = Uri::from_str(&self.remote_target) {
            return Err(LegError::request_generation(format!(
                "invalid remote target '{}': {}",
                self.remote_target, e
            )));
        }

        let mut request = Request::new(method, self.remote_target.clone())
            .with_call_id(self.call_id.clone())
            .with_cseq(self.local_cseq)
            .with_header(Header::max_forwards(i64::from(max_forwards)));

        for header in extra_headers {
            match header {
                Header::MaxForwards(_) => request.set_header(header.clone()),
                _ => request.append_header(header.clone()),
            }
        }
        request.set_body(body);

        Ok(request)
    }

    pub fn inc_local_cseq(&mut self) {
        self.local_cseq = self.local_cseq.wrapping_add(1);
    }

    /// Record the CSeq of an inbound request, rejecting replays and
    /// out-of-order requests (RFC 3261 12.2.2)
    pub fn update_remote_sequence(&mut self, request: &Request) -> LegResult<()> {
        if let Some(last) = self.remote_cseq {
            if request.cseq <= last {
                return Err(LegError::protocol(format!(
                    "Invalid CSeq: got {}, expected > {}",
                    request.cseq, last
                )));
            }
        }
        self.remote_cseq = Some(request.cseq);
        Ok(())
    }
}
