//! Polling configuration and the terminal outcomes of a poll session.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::relay::MaterializedResult;
use crate::status::TaskStatus;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 199;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_ERROR_RETRY_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_ERROR_RETRIES: u32 = 5;
pub const DEFAULT_STUCK_TIMEOUT_MS: u64 = 180_000;

/// Timing and ceilings for one poll session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Hard cap on status fetches per session.
    pub max_attempts: u32,
    /// Delay between cycles after a successful fetch.
    pub poll_interval: Duration,
    /// Delay between cycles after a failed fetch.
    pub error_retry_interval: Duration,
    /// Consecutive fetch failures tolerated before giving up.
    pub max_error_retries: u32,
    /// Longest a job may sit unchanged in a non-terminal status.
    pub stuck_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            error_retry_interval: Duration::from_millis(DEFAULT_ERROR_RETRY_INTERVAL_MS),
            max_error_retries: DEFAULT_MAX_ERROR_RETRIES,
            stuck_timeout: Duration::from_millis(DEFAULT_STUCK_TIMEOUT_MS),
        }
    }
}

impl PollConfig {
    /// Load overrides from the environment, falling back to defaults.
    ///
    /// | Env Var                        | Default  |
    /// |--------------------------------|----------|
    /// | `POLL_MAX_ATTEMPTS`            | `199`    |
    /// | `POLL_INTERVAL_MS`             | `3000`   |
    /// | `POLL_ERROR_RETRY_INTERVAL_MS` | `5000`   |
    /// | `POLL_MAX_ERROR_RETRIES`       | `5`      |
    /// | `POLL_STUCK_TIMEOUT_MS`        | `180000` |
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            max_attempts: env_or("POLL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            poll_interval: Duration::from_millis(env_or(
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            error_retry_interval: Duration::from_millis(env_or(
                "POLL_ERROR_RETRY_INTERVAL_MS",
                DEFAULT_ERROR_RETRY_INTERVAL_MS,
            )?),
            max_error_retries: env_or("POLL_MAX_ERROR_RETRIES", DEFAULT_MAX_ERROR_RETRIES)?,
            stuck_timeout: Duration::from_millis(env_or(
                "POLL_STUCK_TIMEOUT_MS",
                DEFAULT_STUCK_TIMEOUT_MS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would spin or never poll.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() || self.error_retry_interval.is_zero() {
            return Err(CoreError::Validation(
                "poll intervals must be non-zero".into(),
            ));
        }
        if self.stuck_timeout.is_zero() {
            return Err(CoreError::Validation(
                "stuck_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} must be a valid number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// How a poll session ended.
///
/// A session the owner cancelled locally has no outcome at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The provider reported success and the result was materialized.
    Succeeded { result: MaterializedResult },
    /// The provider reported `failed`.
    JobFailed,
    /// The provider reported `cancelled`.
    JobCancelled,
    /// Consecutive fetch failures exceeded the retry ceiling.
    NetworkExhausted { errors: u32, last_error: String },
    /// The job held one non-terminal status past the stuck timeout.
    StuckTimeout { status: TaskStatus, stuck_for_ms: u64 },
    /// The attempt ceiling was reached without a terminal status.
    AttemptsExhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Succeeded { .. } => "Your model is ready".to_string(),
            Self::JobFailed => "The generation task failed".to_string(),
            Self::JobCancelled => "The generation task was cancelled".to_string(),
            Self::NetworkExhausted { .. } => {
                "Network connection problem, please check your connection and try again"
                    .to_string()
            }
            Self::StuckTimeout { status, .. } => {
                format!("The task stayed in the {status} state for too long, please try again")
            }
            Self::AttemptsExhausted { .. } => {
                "The task timed out, please try again or contact support".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = PollConfig::default();
        assert_eq!(config.max_attempts, 199);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.error_retry_interval, Duration::from_secs(5));
        assert_eq!(config.max_error_retries, 5);
        assert_eq!(config.stuck_timeout, Duration::from_secs(180));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = PollConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = PollConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn every_outcome_has_distinct_message() {
        let outcomes = [
            PollOutcome::Succeeded {
                result: MaterializedResult::default(),
            },
            PollOutcome::JobFailed,
            PollOutcome::JobCancelled,
            PollOutcome::NetworkExhausted {
                errors: 6,
                last_error: "timeout".into(),
            },
            PollOutcome::StuckTimeout {
                status: TaskStatus::Running,
                stuck_for_ms: 181_000,
            },
            PollOutcome::AttemptsExhausted { attempts: 199 },
        ];
        let messages: HashSet<String> = outcomes.iter().map(PollOutcome::user_message).collect();
        assert_eq!(messages.len(), outcomes.len());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(PollOutcome::AttemptsExhausted { attempts: 199 }).unwrap();
        assert_eq!(json["kind"], "attempts_exhausted");
        assert_eq!(json["attempts"], 199);

        let json = serde_json::to_value(PollOutcome::StuckTimeout {
            status: TaskStatus::Running,
            stuck_for_ms: 181_000,
        })
        .unwrap();
        assert_eq!(json["kind"], "stuck_timeout");
        assert_eq!(json["status"], "running");
    }
}
