//! Call leg configuration
//!
//! [`LegConfig`] carries the policy knobs shared by every leg created from it:
//! whether transfers use REFER, the Server identity placed on responses and
//! the durations of the expire, credit, keepalive and linger timers.
//!
//! ## Examples
//!
//! ```rust
//! use std::time::Duration;
//! use rvoip_call_leg::config::LegConfig;
//!
//! let config = LegConfig::default()
//!     .with_refer_transfer()
//!     .with_credit_time(Duration::from_secs(3600))
//!     .with_server_header("rvoip-b2bua/0.1");
//! assert!(config.use_refer);
//! ```
//!
//! ### Loading from TOML
//!
//! ```rust
//! use rvoip_call_leg::config::LegConfig;
//!
//! let config = LegConfig::from_toml_str(r#"
//!     use_refer = true
//!     expire_timeout_ms = 16000
//!     keepalive_interval_ms = 30000
//! "#).unwrap();
//! assert_eq!(config.expire_timeout().as_secs(), 16);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{LegError, LegResult};

/// Default Max-Forwards placed on generated requests
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

/// Default number of inbound requests held while an SDP change is pending
pub const DEFAULT_MAX_BACKLOG: usize = 64;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration shared by call legs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegConfig {
    /// Transfer via REFER instead of BYE with an Also header
    pub use_refer: bool,

    /// Value of the Server header on generated responses
    pub server_header: Option<String>,

    /// How long to wait for an ACK after a final 2xx
    pub expire_timeout_ms: u64,

    /// Maximum session duration once connected (credit / billing limit)
    pub credit_time_ms: Option<u64>,

    /// Interval between in-dialog OPTIONS keepalives
    pub keepalive_interval_ms: Option<u64>,

    /// Time a disconnected leg lingers before it is declared dead
    pub disconnect_linger_ms: u64,

    /// Max-Forwards for requests generated without one
    pub max_forwards: u32,

    /// Inbound requests held while a deferred SDP change is pending; further
    /// ones are answered 503
    pub max_backlog: usize,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            use_refer: false,
            server_header: None,
            expire_timeout_ms: 32_000,
            credit_time_ms: None,
            keepalive_interval_ms: None,
            disconnect_linger_ms: 32_000,
            max_forwards: DEFAULT_MAX_FORWARDS,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }
}

impl LegConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> LegResult<Self> {
        let config: LegConfig = toml::from_str(text)
            .map_err(|e| LegError::config(format!("Invalid leg configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> LegResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LegError::config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> LegResult<()> {
        if self.expire_timeout_ms == 0 {
            return Err(LegError::config("expire_timeout_ms must be greater than zero"));
        }
        if self.keepalive_interval_ms == Some(0) {
            return Err(LegError::config("keepalive_interval_ms must be greater than zero"));
        }
        if self.max_forwards == 0 || self.max_forwards > u32::from(u8::MAX) {
            return Err(LegError::config("max_forwards must be between 1 and 255"));
        }
        if self.max_backlog == 0 {
            return Err(LegError::config("max_backlog must be greater than zero"));
        }
        Ok(())
    }

    /// Transfer calls with REFER
    pub fn with_refer_transfer(mut self) -> Self {
        self.use_refer = true;
        self
    }

    /// Set the Server header
    pub fn with_server_header(mut self, server: impl Into<String>) -> Self {
        self.server_header = Some(server.into());
        self
    }

    /// Set the ACK wait timeout
    pub fn with_expire_timeout(mut self, timeout: Duration) -> Self {
        self.expire_timeout_ms = millis(timeout);
        self
    }

    /// Limit the connected session duration
    pub fn with_credit_time(mut self, credit: Duration) -> Self {
        self.credit_time_ms = Some(millis(credit));
        self
    }

    /// Enable OPTIONS keepalives
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval_ms = Some(millis(interval));
        self
    }

    /// Bound the requests held while an SDP change is pending
    pub fn with_max_backlog(mut self, max_backlog: usize) -> Self {
        self.max_backlog = max_backlog;
        self
    }

    /// Set how long a disconnected leg lingers
    pub fn with_disconnect_linger(mut self, linger: Duration) -> Self {
        self.disconnect_linger_ms = millis(linger);
        self
    }

    pub fn expire_timeout(&self) -> Duration {
        Duration::from_millis(self.expire_timeout_ms)
    }

    pub fn credit_time(&self) -> Option<Duration> {
        self.credit_time_ms.map(Duration::from_millis)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_interval_ms.map(Duration::from_millis)
    }

    pub fn disconnect_linger(&self) -> Duration {
        Duration::from_millis(self.disconnect_linger_ms)
    }
}
