use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Configuration for the relay manager
///
/// Defaults match the cadence the session gateway is provisioned for: a
/// status probe every 2 seconds while pairing (up to 300 probes, ten
/// minutes), a message sweep every 5 seconds once authenticated, and a
/// hard ten minute ceiling on the whole connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Milliseconds between status probes while a session is connecting
    pub status_poll_interval_ms: u64,
    /// Milliseconds between message sweeps while authenticated
    pub message_poll_interval_ms: u64,
    /// Status probes before the pairing window is declared expired
    pub max_status_polls: u32,
    /// Consecutive transient status failures tolerated before giving up
    pub max_transient_retries: u32,
    /// Milliseconds before an unauthenticated connection attempt is failed
    /// outright
    pub connection_timeout_ms: u64,
    /// Send credits granted when the manager is built
    pub initial_credits: u32,
}

impl RelayConfig {
    /// Create a configuration with gateway defaults
    pub fn new() -> Self {
        Self {
            status_poll_interval_ms: 2_000,
            message_poll_interval_ms: 5_000,
            max_status_polls: 300,
            max_transient_retries: 3,
            connection_timeout_ms: 600_000,
            initial_credits: 0,
        }
    }

    /// Set the status probe interval
    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the message sweep interval
    pub fn with_message_poll_interval(mut self, interval: Duration) -> Self {
        self.message_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the pairing window in status probes
    pub fn with_max_status_polls(mut self, polls: u32) -> Self {
        self.max_status_polls = polls;
        self
    }

    /// Set the transient failure tolerance
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    /// Set the overall connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the starting credit balance
    pub fn with_initial_credits(mut self, credits: u32) -> Self {
        self.initial_credits = credits;
        self
    }

    /// Status probe interval as a [`Duration`]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    /// Message sweep interval as a [`Duration`]
    pub fn message_poll_interval(&self) -> Duration {
        Duration::from_millis(self.message_poll_interval_ms)
    }

    /// Connection timeout as a [`Duration`]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Reject configurations the pollers cannot run with
    pub fn validate(&self) -> RelayResult<()> {
        if self.status_poll_interval_ms == 0 {
            return Err(RelayError::invalid_configuration(
                "status_poll_interval_ms",
                "status probes need a non-zero interval",
            ));
        }
        if self.message_poll_interval_ms == 0 {
            return Err(RelayError::invalid_configuration(
                "message_poll_interval_ms",
                "message sweeps need a non-zero interval",
            ));
        }
        if self.max_status_polls == 0 {
            return Err(RelayError::invalid_configuration(
                "max_status_polls",
                "pairing needs at least one status probe",
            ));
        }
        if self.connection_timeout_ms == 0 {
            return Err(RelayError::invalid_configuration(
                "connection_timeout_ms",
                "connection attempts need a non-zero deadline",
            ));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}
