//! Planner configuration parameters
//!
//! All tunable timing and retry parameters of the connection planner.
//! Values can be overridden from a JSON blob stored by the embedding
//! firmware; they are validated before use.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core planner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    // --- Telemetry ---
    /// Telemetry interval while no job is running (milliseconds)
    pub telemetry_interval_idle_ms: u32,
    /// Telemetry interval while printing (milliseconds)
    pub telemetry_interval_printing_ms: u32,

    // --- Retries ---
    /// First cooldown after a communication failure (milliseconds)
    pub cooldown_base_ms: u32,
    /// Upper bound of the cooldown (milliseconds)
    pub cooldown_max_ms: u32,
    /// Failed attempts to send the same event before it is dropped
    pub give_up_after_attempts: u8,
    /// Silence after which the server is assumed to have forgotten us
    /// and INFO is re-sent (milliseconds)
    pub reconnect_after_ms: u32,

    // --- Downloads ---
    /// Retry budget of an encrypted download (plain-text ones get none)
    pub encrypted_download_retries: u8,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            // Telemetry
            telemetry_interval_idle_ms: 4_000,
            telemetry_interval_printing_ms: 1_000,

            // Retries
            cooldown_base_ms: 100,
            cooldown_max_ms: 60_000, // 1 min
            give_up_after_attempts: 5,
            reconnect_after_ms: 10_000,

            // Downloads
            encrypted_download_retries: 3,
        }
    }
}

impl PlannerConfig {
    /// Parse and validate a JSON config.  Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the planner.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_interval_idle_ms == 0 || self.telemetry_interval_printing_ms == 0 {
            return Err(ConfigError::ValidationFailed("telemetry interval must be non-zero"));
        }
        if self.cooldown_base_ms == 0 {
            return Err(ConfigError::ValidationFailed("cooldown base must be non-zero"));
        }
        if self.cooldown_max_ms < self.cooldown_base_ms {
            return Err(ConfigError::ValidationFailed("cooldown max below base"));
        }
        if self.give_up_after_attempts == 0 {
            return Err(ConfigError::ValidationFailed("give-up threshold must be non-zero"));
        }
        if self.encrypted_download_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "encrypted downloads need a positive retry budget",
            ));
        }
        Ok(())
    }

    /// Telemetry interval for the given activity.
    pub fn telemetry_interval(&self, printing: bool) -> Duration {
        let ms = if printing {
            self.telemetry_interval_printing_ms
        } else {
            self.telemetry_interval_idle_ms
        };
        Duration::from_millis(u64::from(ms))
    }

    pub fn cooldown_base(&self) -> Duration {
        Duration::from_millis(u64::from(self.cooldown_base_ms))
    }

    pub fn cooldown_max(&self) -> Duration {
        Duration::from_millis(u64::from(self.cooldown_max_ms))
    }

    pub fn reconnect_after(&self) -> Duration {
        Duration::from_millis(u64::from(self.reconnect_after_ms))
    }
}
