//! Message bodies and the SDP rewrites the leg performs

use std::fmt;
use std::str::FromStr;

use rvoip_sip_core::types::sdp::{ConnectionData, SdpSession};

use crate::errors::{LegError, LegResult};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Connection address that marks a session as held (RFC 2543 style hold)
pub const HOLD_ADDRESS: &str = "0.0.0.0";

/// A message body.
///
/// Bodies compare textually: two descriptions that differ only in whitespace
/// or line order are different bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgBody {
    content_type: String,
    text: String,
    needs_update: bool,
}

impl MsgBody {
    pub fn new(content_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            text: text.into(),
            needs_update: true,
        }
    }

    /// An `application/sdp` body
    pub fn sdp(text: impl Into<String>) -> Self {
        Self::new(SDP_CONTENT_TYPE, text)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a local SDP hook still has to process this body
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(&mut self, needs_update: bool) {
        self.needs_update = needs_update;
    }

    pub fn with_needs_update(mut self, needs_update: bool) -> Self {
        self.needs_update = needs_update;
        self
    }

    /// Byte-for-byte comparison of the body text
    pub fn same_text(&self, other: &MsgBody) -> bool {
        self.text == other.text
    }

    pub fn parsed(&self) -> LegResult<SdpSession> {
        SdpSession::from_str(&self.text).map_err(|e| LegError::malformed_body(e.to_string()))
    }

    /// Connection addresses of every `c=` line, session level first
    pub fn connection_addresses(&self) -> LegResult<Vec<String>> {
        let session = self.parsed()?;
        let media = session.media_descriptions.iter().filter_map(|m| m.connection_info.as_ref());
        Ok(session
            .connection_info
            .iter()
            .chain(media)
            .map(|c| c.connection_address.clone())
            .collect())
    }

    /// Copy of this body with every connection address replaced
    pub fn with_connection_address(&self, address: &str) -> LegResult<MsgBody> {
        let mut session = self.parsed()?;
        set_connection_address(&mut session, address);
        Ok(MsgBody {
            content_type: self.content_type.clone(),
            text: session.to_string(),
            needs_update: self.needs_update,
        })
    }
}

impl fmt::Display for MsgBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Replace the address of every `c=` line, session and media level.
/// A description without connection lines is left untouched.
pub fn set_connection_address(session: &mut SdpSession, address: &str) {
    let addr_type = if address.contains(':') { "IP6" } else { "IP4" };
    let media = session
        .media_descriptions
        .iter_mut()
        .filter_map(|m| m.connection_info.as_mut());
    for connection in session.connection_info.iter_mut().chain(media) {
        rewrite(connection, addr_type, address);
    }
}

fn rewrite(connection: &mut ConnectionData, addr_type: &str, address: &str) {
    connection.addr_type = addr_type.to_string();
    connection.connection_address = address.to_string();
}
