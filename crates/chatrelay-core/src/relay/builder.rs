//! Relay builder for wiring a provider into a manager

use std::sync::Arc;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};
use crate::provider::MessagingProvider;
use crate::relay::config::RelayConfig;
use crate::relay::manager::RelayManager;
use crate::relay::send::AutoResponder;

/// Builder for creating a relay manager
pub struct RelayBuilder {
    config: RelayConfig,
    provider: Option<Arc<dyn MessagingProvider>>,
    auto_responder: Option<Arc<dyn AutoResponder>>,
}

impl RelayBuilder {
    /// Create a new relay builder
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            provider: None,
            auto_responder: None,
        }
    }

    /// Set the messaging provider the relay drives
    pub fn provider(mut self, provider: Arc<dyn MessagingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an auto-responder consulted for every inbound message
    pub fn auto_responder(mut self, responder: Arc<dyn AutoResponder>) -> Self {
        self.auto_responder = Some(responder);
        self
    }

    /// Set the status probe interval
    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.config.status_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the message sweep interval
    pub fn message_poll_interval(mut self, interval: Duration) -> Self {
        self.config.message_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the pairing window in status probes
    pub fn max_status_polls(mut self, polls: u32) -> Self {
        self.config.max_status_polls = polls;
        self
    }

    /// Set the overall connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the starting credit balance
    pub fn initial_credits(mut self, credits: u32) -> Self {
        self.config.initial_credits = credits;
        self
    }

    /// Build the relay manager
    pub fn build(self) -> RelayResult<Arc<RelayManager>> {
        self.config.validate()?;
        let provider = self.provider.ok_or(RelayError::MissingConfiguration {
            field: "provider".to_string(),
        })?;
        Ok(RelayManager::new(self.config, provider, self.auto_responder))
    }
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
