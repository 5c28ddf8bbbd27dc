//! SIP request methods

use std::fmt;
use std::str::FromStr;

/// Request method.
///
/// Method tokens are case-sensitive (RFC 3261 §7.1): `"invite"` is an
/// extension method, not INVITE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Refer,
    Info,
    Options,
    Update,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Refer => "REFER",
            Method::Info => "INFO",
            Method::Options => "OPTIONS",
            Method::Update => "UPDATE",
            Method::Other(token) => token,
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REFER" => Method::Refer,
            "INFO" => Method::Info,
            "OPTIONS" => Method::Options,
            "UPDATE" => Method::Update,
            other => Method::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
