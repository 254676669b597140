//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const MAX_WINDOW_MONTHS: u32 = 60;

/// Settings read from the `[engine]` table of the client config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Occurrence queries default to ±this many months around today
    pub occurrence_window_months: u32,
    /// Retained past events missing from snapshots for longer than this are evicted
    pub past_grace_days: i64,
    pub channel_retry_attempts: u32,
    pub channel_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            occurrence_window_months: 6,
            past_grace_days: 30,
            channel_retry_attempts: 3,
            channel_retry_delay_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.occurrence_window_months == 0 {
            return Err(EngineError::Config(
                "occurrence_window_months must be at least 1".into(),
            ));
        }
        if self.occurrence_window_months > MAX_WINDOW_MONTHS {
            return Err(EngineError::Config(format!(
                "occurrence_window_months cannot exceed {}",
                MAX_WINDOW_MONTHS
            )));
        }
        if self.past_grace_days < 0 {
            return Err(EngineError::Config("past_grace_days cannot be negative".into()));
        }
        Ok(())
    }

    pub fn past_grace(&self) -> chrono::Duration {
        chrono::Duration::days(self.past_grace_days.max(0))
    }

    pub fn channel_retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.channel_retry_delay_ms)
    }

    /// Days ahead to look when ordering recurring events by their next occurrence.
    pub fn horizon_days(&self) -> u32 {
        self.occurrence_window_months.saturating_mul(31)
    }
}
