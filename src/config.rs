//! Connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    constants::{
        DEFAULT_AMI_PORT, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, MAX_EVENT_QUEUE_SIZE,
    },
    error::{AmiError, AmiResult},
};

/// Settings for one AMI connection.
///
/// Deserializable so applications can embed it in their own config files;
/// everything but the credentials and host has a default.
///
/// ```
/// use asterisk_ami_tokio::AmiConfig;
/// use std::time::Duration;
///
/// let config = AmiConfig::new("pbx.example.com", "admin", "s3cret")
///     .with_events(false)
///     .with_read_timeout(Duration::from_secs(5));
/// assert_eq!(config.port, 5038);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AmiConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// TCP connect deadline.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for the banner, the login reply and every action reply.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// `Events: on` at login. Off means the server sends no unsolicited events.
    #[serde(default = "default_events")]
    pub events: bool,
    /// Interval between keep-alive `Ping`s. `0` disables them.
    #[serde(default)]
    pub keepalive_interval_ms: u64,
    /// Close the connection after this long without inbound bytes. `0` disables the check.
    #[serde(default)]
    pub liveness_timeout_ms: u64,
    /// Capacity of each event stream's queue.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

fn default_port() -> u16 {
    DEFAULT_AMI_PORT
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}
fn default_events() -> bool {
    true
}
fn default_event_queue_size() -> usize {
    MAX_EVENT_QUEUE_SIZE
}

impl std::fmt::Debug for AmiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("events", &self.events)
            .field("keepalive_interval_ms", &self.keepalive_interval_ms)
            .field("liveness_timeout_ms", &self.liveness_timeout_ms)
            .field("event_queue_size", &self.event_queue_size)
            .finish()
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl AmiConfig {
    /// Defaults for everything except host and credentials.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            secret: secret.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            events: default_events(),
            keepalive_interval_ms: 0,
            liveness_timeout_ms: 0,
            event_queue_size: default_event_queue_size(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_events(mut self, events: bool) -> Self {
        self.events = events;
        self
    }

    /// `Duration::ZERO` disables keep-alive pings.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval_ms = duration_ms(interval);
        self
    }

    /// `Duration::ZERO` disables the liveness check.
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }

    pub fn liveness_timeout(&self) -> Option<Duration> {
        (self.liveness_timeout_ms > 0).then(|| Duration::from_millis(self.liveness_timeout_ms))
    }

    /// Reject settings that cannot produce a working session.
    pub fn validate(&self) -> AmiResult<()> {
        for (name, value) in [("username", &self.username), ("secret", &self.secret)] {
            if value.is_empty() {
                return Err(AmiError::invalid_config(format!("{} must not be empty", name)));
            }
            if value.contains('\r') || value.contains('\n') {
                return Err(AmiError::invalid_config(format!(
                    "{} must not contain line breaks",
                    name
                )));
            }
        }
        if self.port == 0 {
            return Err(AmiError::invalid_config("port must not be 0"));
        }
        if self.read_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(AmiError::invalid_config("timeouts must be greater than 0"));
        }
        Ok(())
    }
}
