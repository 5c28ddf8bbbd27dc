//! SIP message values exchanged with the transaction layer
//!
//! Wire parsing and serialization belong to the transport/transaction stack.
//! This module only models what the leg reads from inbound requests and writes
//! onto outbound ones:
//!
//! - [`Method`]: request methods the leg dispatches on (case-sensitive)
//! - [`Request`] / [`Response`]: message values with an optional body
//! - [`Header`]: the headers the leg consumes or generates (Refer-To,
//!   Referred-By, Also, Max-Forwards, Reason)
//! - [`AddressHeader`] / [`SipAddress`]: name-addr header values whose body is
//!   parsed on demand and may fail

pub mod headers;
pub mod method;
pub mod request;
pub mod response;

pub use headers::{AddressHeader, Header, MaxForwardsHeader, SipAddress};
pub use method::Method;
pub use request::Request;
pub use response::Response;
