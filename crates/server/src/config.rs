//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::presence_registry::STALE_THRESHOLD_MS;

pub const DEFAULT_BIND: &str = "127.0.0.1:4000";
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },

    #[error(
        "sweep interval ({sweep_ms}ms) must be shorter than the staleness threshold ({stale_ms}ms)"
    )]
    SweepNotShorterThanThreshold { sweep_ms: u64, stale_ms: u64 },
}

/// Timing for presence expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    stale_after_ms: u64,
    sweep_interval_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: STALE_THRESHOLD_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl PresenceConfig {
    /// The sweep must run more often than sessions go stale, otherwise a slow
    /// tick could evict a tab that is still heartbeating.
    pub fn new(stale_after_ms: u64, sweep_interval_ms: u64) -> Result<Self, ConfigError> {
        if stale_after_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "stale-after-ms",
            });
        }
        if sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                name: "sweep-interval-ms",
            });
        }
        if sweep_interval_ms >= stale_after_ms {
            return Err(ConfigError::SweepNotShorterThanThreshold {
                sweep_ms: sweep_interval_ms,
                stale_ms: stale_after_ms,
            });
        }
        Ok(Self {
            stale_after_ms,
            sweep_interval_ms,
        })
    }

    pub fn stale_after_ms(&self) -> u64 {
        self.stale_after_ms
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Report loopback callers as `localhost (dev)` instead of `unknown`.
    pub dev_mode: bool,
    pub presence: PresenceConfig,
}
