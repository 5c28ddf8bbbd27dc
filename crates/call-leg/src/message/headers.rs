//! Header values consumed and generated by the leg
//!
//! Address headers keep their raw text and parse it only when a handler asks
//! for the body, mirroring how the transaction layer hands headers over: a
//! request carrying a broken `Refer-To` is still a valid request until the
//! REFER handler needs the target.

use std::fmt;
use std::str::FromStr;

use rvoip_sip_core::types::address::Address;
use rvoip_sip_core::types::max_forwards::MaxForwards;
use rvoip_sip_core::types::refer_to::ReferTo;
use rvoip_sip_core::types::uri::Uri;

use crate::errors::{LegError, LegResult};

pub const REFER_TO: &str = "Refer-To";
pub const REFERRED_BY: &str = "Referred-By";
pub const ALSO: &str = "Also";
pub const MAX_FORWARDS: &str = "Max-Forwards";
pub const REASON: &str = "Reason";

/// A name-addr / addr-spec value, parsed by the SIP stack's address grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipAddress(Address);

impl SipAddress {
    /// Address with a bare URI and no display name or parameters
    pub fn new(uri: Uri) -> Self {
        Self(Address {
            display_name: None,
            uri,
            params: Vec::new(),
        })
    }

    /// Parse a header value in name-addr (`"Bob" <sip:bob@host>;p=1`) or
    /// addr-spec (`sip:bob@host;p=1`) form.
    pub fn parse(header: &'static str, text: &str) -> LegResult<SipAddress> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LegError::malformed_header(header, "empty value"));
        }
        Address::from_str(text)
            .map(SipAddress)
            .map_err(|e| LegError::malformed_header(header, e.to_string()))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.0.display_name = Some(name.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.0.set_param(name, value);
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.0.uri
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0.display_name.as_deref()
    }

    /// Copy of this address carrying only the URI
    pub fn uri_only(&self) -> SipAddress {
        SipAddress::new(self.0.uri.clone())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.0.get_param(name).flatten()
    }

    pub fn address(&self) -> &Address {
        &self.0
    }
}

impl From<Address> for SipAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for SipAddress {
    type Err = LegError;

    fn from_str(s: &str) -> LegResult<Self> {
        SipAddress::parse("Address", s)
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An address-valued header whose body is parsed on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressHeader {
    name: &'static str,
    raw: String,
}

impl AddressHeader {
    pub fn from_raw(name: &'static str, raw: impl Into<String>) -> Self {
        Self {
            name,
            raw: raw.into(),
        }
    }

    pub fn from_address(name: &'static str, address: &SipAddress) -> Self {
        Self {
            name,
            raw: address.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parse the header body
    pub fn body(&self) -> LegResult<SipAddress> {
        if self.name != REFER_TO {
            return SipAddress::parse(self.name, &self.raw);
        }
        ReferTo::from_str(self.raw.trim())
            .map(|refer_to| SipAddress(refer_to.0))
            .map_err(|e| LegError::malformed_header(self.name, e.to_string()))
    }
}

/// Max-Forwards value, kept raw until read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxForwardsHeader {
    raw: String,
}

impl MaxForwardsHeader {
    pub fn new(hops: i64) -> Self {
        Self {
            raw: hops.to_string(),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Remaining hop count
    pub fn body(&self) -> LegResult<i64> {
        MaxForwards::from_str(self.raw.trim())
            .map(|hops| i64::from(hops.0))
            .map_err(|e| LegError::malformed_header(MAX_FORWARDS, format!("'{}': {}", self.raw, e)))
    }
}

/// Headers the leg reads from requests or places on generated ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    ReferTo(AddressHeader),
    ReferredBy(AddressHeader),
    Also(AddressHeader),
    MaxForwards(MaxForwardsHeader),
    Reason(String),
    Extension { name: String, value: String },
}

impl Header {
    pub fn refer_to(address: &SipAddress) -> Self {
        Header::ReferTo(AddressHeader::from_address(REFER_TO, address))
    }

    pub fn referred_by(address: &SipAddress) -> Self {
        Header::ReferredBy(AddressHeader::from_address(REFERRED_BY, address))
    }

    pub fn also(address: &SipAddress) -> Self {
        Header::Also(AddressHeader::from_address(ALSO, address))
    }

    pub fn max_forwards(hops: i64) -> Self {
        Header::MaxForwards(MaxForwardsHeader::new(hops))
    }

    /// Build a header from its name and raw value as received on the wire
    pub fn from_raw(name: &str, value: &str) -> Self {
        if name.eq_ignore_ascii_case(REFER_TO) || name == "r" {
            Header::ReferTo(AddressHeader::from_raw(REFER_TO, value))
        } else if name.eq_ignore_ascii_case(REFERRED_BY) || name == "b" {
            Header::ReferredBy(AddressHeader::from_raw(REFERRED_BY, value))
        } else if name.eq_ignore_ascii_case(ALSO) {
            Header::Also(AddressHeader::from_raw(ALSO, value))
        } else if name.eq_ignore_ascii_case(MAX_FORWARDS) {
            Header::MaxForwards(MaxForwardsHeader::from_raw(value))
        } else if name.eq_ignore_ascii_case(REASON) {
            Header::Reason(value.to_string())
        } else {
            Header::Extension {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Header::ReferTo(_) => REFER_TO,
            Header::ReferredBy(_) => REFERRED_BY,
            Header::Also(_) => ALSO,
            Header::MaxForwards(_) => MAX_FORWARDS,
            Header::Reason(_) => REASON,
            Header::Extension { name, .. } => name,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Header::ReferTo(h) | Header::ReferredBy(h) | Header::Also(h) => h.raw(),
            Header::MaxForwards(h) => &h.raw,
            Header::Reason(reason) => reason,
            Header::Extension { value, .. } => value,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.value())
    }
}
