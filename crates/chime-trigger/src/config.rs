//! Tunables for fire-time searches and misfire detection.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::TriggerError;

// Validation constants
const DEFAULT_MAX_CALENDAR_SKIPS: u32 = 100_000;
const MAX_CALENDAR_SKIPS_LIMIT: u32 = 10_000_000;
const DEFAULT_MISFIRE_THRESHOLD_MS: u64 = 60_000;
const MAX_MISFIRE_THRESHOLD_MS: u64 = 7 * 24 * 3600 * 1000; // one week

/// Configuration shared by triggers and the scheduler driving them.
///
/// # Examples
///
/// ```rust
/// use chime_trigger::TriggerConfig;
///
/// let config = TriggerConfig::builder()
///     .max_calendar_skips(1_000)
///     .misfire_threshold_ms(5_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_calendar_skips, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// How many calendar-excluded candidates a fire-time search may skip
    /// before giving up with [`TriggerError::SchedulingImpossible`].
    #[serde(default = "default_max_calendar_skips")]
    pub max_calendar_skips: u32,

    /// How late a fire time may be before the scheduler treats it as a misfire.
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: u64,
}

pub(crate) fn default_max_calendar_skips() -> u32 {
    DEFAULT_MAX_CALENDAR_SKIPS
}

fn default_misfire_threshold_ms() -> u64 {
    DEFAULT_MISFIRE_THRESHOLD_MS
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_calendar_skips: DEFAULT_MAX_CALENDAR_SKIPS,
            misfire_threshold_ms: DEFAULT_MISFIRE_THRESHOLD_MS,
        }
    }
}

impl TriggerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TriggerConfigBuilder {
        TriggerConfigBuilder::new()
    }

    /// Parse and validate a configuration from JSON.
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TriggerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The misfire threshold as a duration.
    pub fn misfire_threshold(&self) -> Duration {
        // Bounded by MAX_MISFIRE_THRESHOLD_MS once validated
        Duration::milliseconds(i64::try_from(self.misfire_threshold_ms).unwrap_or(i64::MAX))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::InvalidConfig` if the skip bound is zero or above
    /// its limit, or if the misfire threshold exceeds one week.
    pub fn validate(&self) -> Result<(), TriggerError> {
        if !(1..=MAX_CALENDAR_SKIPS_LIMIT).contains(&self.max_calendar_skips) {
            return Err(TriggerError::InvalidConfig(format!(
                "max_calendar_skips must be between 1 and {MAX_CALENDAR_SKIPS_LIMIT} (got {})",
                self.max_calendar_skips
            )));
        }

        if self.misfire_threshold_ms > MAX_MISFIRE_THRESHOLD_MS {
            return Err(TriggerError::InvalidConfig(format!(
                "misfire_threshold_ms must be at most {MAX_MISFIRE_THRESHOLD_MS} (got {})",
                self.misfire_threshold_ms
            )));
        }

        Ok(())
    }
}

/// Builder for [`TriggerConfig`].
pub struct TriggerConfigBuilder {
    config: TriggerConfig,
}

impl Default for TriggerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerConfigBuilder {
    /// Create a builder holding the default configuration.
    pub fn new() -> Self {
        Self {
            config: TriggerConfig::default(),
        }
    }

    /// Set the calendar skip bound.
    #[must_use]
    pub fn max_calendar_skips(mut self, skips: u32) -> Self {
        self.config.max_calendar_skips = skips;
        self
    }

    /// Set the misfire threshold in milliseconds.
    #[must_use]
    pub fn misfire_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.config.misfire_threshold_ms = threshold_ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::InvalidConfig` if the configuration is invalid.
    pub fn build(self) -> Result<TriggerConfig, TriggerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
