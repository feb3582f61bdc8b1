//! Engine configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::core::timing::{DEFAULT_MAX_RETRIES, DEFAULT_PING_TIME_MS, FIRST_PING_DELAY, PING_INTERVAL};
use crate::core::{DEFAULT_PORT, EngineError, EngineResult, MAX_CALL_NUMBER};
use crate::jitter::JitterConfig;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Preferred local address; a taken port falls back to any free one.
    pub bind_addr: SocketAddr,

    /// Retransmissions allowed per reliable frame.
    pub max_retries: u32,

    /// Period of the per-session ping.
    pub ping_interval: Duration,

    /// Delay before a new session's first ping.
    pub first_ping_delay: Duration,

    /// Round-trip estimate a session starts with, in ms.
    pub default_ping_time_ms: i64,

    /// Re-pace inbound media through a jitter buffer. When off, events are
    /// delivered as soon as they arrive.
    pub use_jitterbuffer: bool,

    /// Jitter buffer settings applied to every new session.
    pub jitter: JitterConfig,

    /// First call number to allocate. Random when unset.
    pub first_call_number: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_retries: DEFAULT_MAX_RETRIES,
            ping_interval: PING_INTERVAL,
            first_ping_delay: FIRST_PING_DELAY,
            default_ping_time_ms: DEFAULT_PING_TIME_MS,
            use_jitterbuffer: true,
            jitter: JitterConfig::default(),
            first_call_number: None,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.ping_interval.is_zero() {
            return Err(EngineError::Config("ping interval must be non-zero".into()));
        }
        if self.default_ping_time_ms <= 0 {
            return Err(EngineError::Config(format!(
                "default ping time must be positive, got {}",
                self.default_ping_time_ms
            )));
        }
        if let Some(first) = self.first_call_number {
            if first == 0 || first > MAX_CALL_NUMBER {
                return Err(EngineError::Config(format!(
                    "first call number {first} outside 1..={MAX_CALL_NUMBER}"
                )));
            }
        }
        if self.jitter.max_jitterbuf < 0 || self.jitter.max_contig_interp < 0 {
            return Err(EngineError::Config(
                "jitter buffer limits must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for an [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the preferred port on all interfaces.
    pub fn port(mut self, port: u16) -> Self {
        self.config.bind_addr.set_port(port);
        self
    }

    /// Set the retry budget of reliable frames.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the ping period.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Enable or disable the jitter buffer.
    pub fn jitterbuffer(mut self, enabled: bool) -> Self {
        self.config.use_jitterbuffer = enabled;
        self
    }

    /// Set the jitter buffer's extra target delay in ms.
    pub fn jitter_target_extra(mut self, ms: i64) -> Self {
        self.config.jitter.target_extra = ms;
        self
    }

    /// Set the jitter buffer's hard size cap in ms (0 = uncapped).
    pub fn max_jitterbuf(mut self, ms: i64) -> Self {
        self.config.jitter.max_jitterbuf = ms;
        self
    }

    /// Set the jitter buffer's resync threshold in ms (-1 disables).
    pub fn resync_threshold(mut self, ms: i64) -> Self {
        self.config.jitter.resync_threshold = ms;
        self
    }

    /// Set the cap on consecutive interpolations (0 = unlimited).
    pub fn max_contig_interp(mut self, frames: i64) -> Self {
        self.config.jitter.max_contig_interp = frames;
        self
    }

    /// Fix the first call number.
    pub fn first_call_number(mut self, call: u16) -> Self {
        self.config.first_call_number = Some(call);
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> EngineResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
