//! Leg error definitions

use thiserror::Error;

/// Result type for call-leg operations
pub type LegResult<T> = Result<T, LegError>;

/// Errors raised while a leg handles a request, event or timer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegError {
    /// A header required by the handler could not be parsed
    #[error("Malformed {header} header: {message}")]
    MalformedHeader {
        header: &'static str,
        message: String,
    },

    /// Request violates dialog rules (e.g. out-of-order CSeq)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A message body could not be parsed or rewritten
    #[error("Malformed body: {message}")]
    MalformedBody { message: String },

    /// An outgoing request could not be built from the dialog
    #[error("Request generation failed: {message}")]
    RequestGeneration { message: String },

    /// The transaction layer refused to start or continue a transaction
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// An SDP change hook rejected the body
    #[error("SDP hook failed: {message}")]
    SdpHook { message: String },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Logging could not be initialised
    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl LegError {
    /// Create a malformed header error
    pub fn malformed_header(header: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            header,
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a malformed body error
    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::MalformedBody {
            message: message.into(),
        }
    }

    /// Create a request generation error
    pub fn request_generation(message: impl Into<String>) -> Self {
        Self::RequestGeneration {
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an SDP hook error
    pub fn sdp_hook(message: impl Into<String>) -> Self {
        Self::SdpHook {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
