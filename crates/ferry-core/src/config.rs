//! Configuration for the queue bindings and the poll loop.
//!
//! Defaults carry the bindings the pipeline was first deployed with.

use std::time::Duration;

use crate::domain::{ConnectError, Header};

/// Input queue binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub consumer_group: String,
    pub partition: u32,
    /// Smallest fetch the reader asks the broker for.
    pub min_batch_bytes: usize,
    /// Largest fetch; a single record above this cannot be read.
    pub max_batch_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "income".to_string(),
            consumer_group: "consumer-group-id-1".to_string(),
            partition: 0,
            min_batch_bytes: 10_000,     // 10 KB
            max_batch_bytes: 10_000_000, // 10 MB
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<(), ConnectError> {
        validate_binding(&self.brokers, &self.topic)?;
        if self.consumer_group.is_empty() {
            return Err(ConnectError::InvalidConfig(
                "consumer group must not be empty".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(ConnectError::InvalidConfig(
                "max batch bytes must be positive".to_string(),
            ));
        }
        if self.min_batch_bytes > self.max_batch_bytes {
            return Err(ConnectError::InvalidConfig(format!(
                "min batch bytes ({}) exceeds max batch bytes ({})",
                self.min_batch_bytes, self.max_batch_bytes
            )));
        }
        Ok(())
    }
}

/// Write-side partition selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancerKind {
    /// Favor the partition with the smallest byte backlog.
    #[default]
    LeastBytes,
}

/// Output queue binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub balancer: BalancerKind,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "outcome".to_string(),
            balancer: BalancerKind::LeastBytes,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<(), ConnectError> {
        validate_binding(&self.brokers, &self.topic)
    }
}

fn validate_binding(brokers: &[String], topic: &str) -> Result<(), ConnectError> {
    if brokers.is_empty() || brokers.iter().any(|b| b.is_empty()) {
        return Err(ConnectError::InvalidConfig(
            "broker list must contain non-empty addresses".to_string(),
        ));
    }
    if topic.is_empty() {
        return Err(ConnectError::InvalidConfig(
            "topic must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Timing and tagging for the poll loop. Deadlines are per call, not per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Wait before every cycle.
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub commit_timeout: Duration,
    /// Fixed header attached to every forwarded record.
    pub forward_header: Header,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
            commit_timeout: Duration::from_secs(1),
            forward_header: Header::new("my-header", b"my-value".to_vec()),
        }
    }
}

/// Everything needed to build and start one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub reader: ReaderConfig,
    pub writer: WriterConfig,
    pub poll: LoopConfig,
    /// Schema name of the handler to select from the registry.
    pub handler: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            writer: WriterConfig::default(),
            poll: LoopConfig::default(),
            handler: "info.v1".to_string(),
        }
    }
}
