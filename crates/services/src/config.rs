//! Tunables shared by the playback, progress, and quiz services.

use std::time::Duration;

use course_core::playback::DEFAULT_SKIP_TOLERANCE_SECS;
use thiserror::Error;

/// Seconds allowed per quiz question.
pub const DEFAULT_QUESTION_SECONDS: u32 = 60;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("countdown tick must be greater than zero")]
    ZeroCountdownTick,
    #[error("skip tolerance must be a finite, non-negative number, got {0}")]
    InvalidSkipTolerance(f64),
    #[error("checkpoint interval must be a finite, positive number, got {0}")]
    InvalidCheckpoint(f64),
    #[error("question time limit must be at least one second")]
    ZeroQuestionSeconds,
    #[error("progress bus needs room for at least one pending notification")]
    ZeroBusCapacity,
}

/// Engine settings. `Default` matches production behavior; tests shrink the
/// timings through the `with_*` builders.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How often the watch loop samples the player.
    pub poll_interval: Duration,
    /// Forward slack accepted between two samples.
    pub skip_tolerance_secs: f64,
    /// Validated-position advance between persisted checkpoints.
    pub position_checkpoint_secs: f64,
    pub question_seconds: u32,
    /// Wall-clock length of one countdown second.
    pub countdown_tick: Duration,
    /// How long grading waits for the attempt write before reporting it unsaved.
    pub persist_timeout: Duration,
    pub bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            skip_tolerance_secs: DEFAULT_SKIP_TOLERANCE_SECS,
            position_checkpoint_secs: 10.0,
            question_seconds: DEFAULT_QUESTION_SECONDS,
            countdown_tick: Duration::from_secs(1),
            persist_timeout: Duration::from_secs(5),
            bus_capacity: 16,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_skip_tolerance(mut self, seconds: f64) -> Self {
        self.skip_tolerance_secs = seconds;
        self
    }

    #[must_use]
    pub fn with_position_checkpoint(mut self, seconds: f64) -> Self {
        self.position_checkpoint_secs = seconds;
        self
    }

    #[must_use]
    pub fn with_question_seconds(mut self, seconds: u32) -> Self {
        self.question_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    #[must_use]
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Check every field before the services start using it.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.countdown_tick.is_zero() {
            return Err(ConfigError::ZeroCountdownTick);
        }
        if !self.skip_tolerance_secs.is_finite() || self.skip_tolerance_secs < 0.0 {
            return Err(ConfigError::InvalidSkipTolerance(self.skip_tolerance_secs));
        }
        if !self.position_checkpoint_secs.is_finite() || self.position_checkpoint_secs <= 0.0 {
            return Err(ConfigError::InvalidCheckpoint(
                self.position_checkpoint_secs,
            ));
        }
        if self.question_seconds == 0 {
            return Err(ConfigError::ZeroQuestionSeconds);
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::ZeroBusCapacity);
        }
        Ok(())
    }
}
