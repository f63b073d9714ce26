//! Container configuration
//!
//! A container is provisioned from one `ContainerConfig`, usually read from a
//! `[[container]]` table of the binary's TOML file:
//!
//! ```toml
//! [[container]]
//! destination = "queue://orders"
//! session-mode = "transacted"
//! min-receivers = 2
//! max-receivers = 8
//! idle-limit = 5
//! receive-timeout-ms = 500
//! ```
//!
//! Every key is optional except `destination`.

use crate::broker::api::{ConsumerSpec, Destination, SessionMode};
use crate::container::error::{ContainerError, ContainerResult};
use crate::core::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How much broker state a receiver keeps between executions
///
/// Ordered: each level retains everything the previous one does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CacheLevel {
    /// A connection is opened and closed around every execution
    None,
    /// One shared connection; sessions and consumers are per execution
    Connection,
    /// Shared connection plus a session and consumer held by each receiver
    #[default]
    AdministeredObjects,
}

impl CacheLevel {
    pub fn shares_connection(&self) -> bool {
        *self >= CacheLevel::Connection
    }

    pub fn caches_consumer(&self) -> bool {
        *self >= CacheLevel::AdministeredObjects
    }

    pub fn label(&self) -> &'static str {
        match self {
            CacheLevel::None => "CACHE_NONE",
            CacheLevel::Connection => "CACHE_CONNECTION",
            CacheLevel::AdministeredObjects => "CACHE_ADMINISTERED_OBJECTS",
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ContainerConfig {
    /// `queue://name`, `topic://name` or a bare queue name
    pub destination: String,
    pub session_mode: SessionMode,
    pub cache_level: CacheLevel,
    pub min_receivers: usize,
    pub max_receivers: usize,
    /// Consecutive idle executions before a receiver may retire
    pub idle_limit: u32,
    /// Receives per scheduled execution; 0 keeps a receiver looping until stopped
    pub max_messages_per_execution: u32,
    pub receive_timeout_ms: u64,
    pub recovery_interval_ms: u64,
    pub backoff_period_ms: u64,
    pub recovery_attempts_before_backoff: u32,
    /// Topic only: consume through a durable subscription
    pub durable: bool,
    pub subscription_name: Option<String>,
    pub selector: Option<String>,
    /// When false, messages published on the consumer's own connection are skipped
    pub local_delivery: bool,
    pub client_id: Option<String>,
    /// Global transactions only
    pub transaction_timeout_secs: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            session_mode: SessionMode::default(),
            cache_level: CacheLevel::default(),
            min_receivers: 1,
            max_receivers: 1,
            idle_limit: 1,
            max_messages_per_execution: 10,
            receive_timeout_ms: 1000,
            recovery_interval_ms: 5000,
            backoff_period_ms: 30000,
            recovery_attempts_before_backoff: 10,
            durable: false,
            subscription_name: None,
            selector: None,
            local_delivery: true,
            client_id: None,
            transaction_timeout_secs: 30,
        }
    }
}

impl ContainerConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Parsed destination
    pub fn parsed_destination(&self) -> ContainerResult<Destination> {
        if self.destination.trim().is_empty() {
            return Err(ContainerError::configuration("destination must not be empty"));
        }
        self.destination
            .parse()
            .map_err(|_| ContainerError::configuration(format!("invalid destination '{}'", self.destination)))
    }

    /// Check the configuration, raising `max-receivers` to `min-receivers` if needed
    pub fn validate(&mut self) -> ContainerResult<Destination> {
        let destination = self.parsed_destination()?;

        if self.receive_timeout_ms == 0 {
            return Err(ContainerError::configuration(
                "receive-timeout-ms must be greater than zero",
            ));
        }
        if self.recovery_interval_ms == 0 {
            return Err(ContainerError::configuration(
                "recovery-interval-ms must be greater than zero",
            ));
        }
        if self.min_receivers == 0 {
            return Err(ContainerError::configuration("min-receivers must be at least 1"));
        }
        if self.max_receivers == 0 {
            return Err(ContainerError::configuration("max-receivers must be at least 1"));
        }
        if self.idle_limit == 0 {
            return Err(ContainerError::configuration("idle-limit must be at least 1"));
        }
        if self.durable {
            if !destination.is_topic() {
                return Err(ContainerError::configuration(format!(
                    "durable subscriptions need a topic, not {}",
                    destination
                )));
            }
            let unnamed = self
                .subscription_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty());
            if unnamed {
                return Err(ContainerError::configuration(
                    "durable subscriptions need a subscription-name",
                ));
            }
        }
        if self.max_receivers < self.min_receivers {
            log::warn!(
                "max-receivers {} is below min-receivers {} for {}; raising it",
                self.max_receivers,
                self.min_receivers,
                destination
            );
            self.max_receivers = self.min_receivers;
        }
        Ok(destination)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            recovery_interval: Duration::from_millis(self.recovery_interval_ms),
            backoff_period: Duration::from_millis(self.backoff_period_ms),
            attempts_before_backoff: self.recovery_attempts_before_backoff,
        }
    }

    /// Consumer options for `destination`
    ///
    /// `local-delivery` is applied to durable subscriptions too.
    pub fn consumer_spec(&self, destination: &Destination) -> ConsumerSpec {
        let mut spec = ConsumerSpec::new(destination.clone());
        spec.selector = self.selector.clone().filter(|s| !s.trim().is_empty());
        if destination.is_topic() {
            spec.no_local = !self.local_delivery;
            if self.durable {
                spec.durable_name = self.subscription_name.clone();
            }
        }
        spec
    }
}
