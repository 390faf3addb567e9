//! Link configuration.
//!
//! All sizes are fixed for the lifetime of a link. Values come from defaults
//! matching the reference firmware, optionally overridden by a TOML file.

use crate::error::{LinkError, Result};
use crate::link::CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default capacity of each byte stream (4KB)
pub const DEFAULT_STREAM_CAPACITY: usize = 4096;

/// Default single-submission limit, equal to the outbound capacity
pub const DEFAULT_MAX_SUBMISSION: usize = 4096;

/// Default consumer dequeue block (1KB)
pub const DEFAULT_CONSUMER_BLOCK: usize = 1024;

/// Default consumer bounded wait
pub const DEFAULT_CONSUMER_WAIT_MS: u64 = 2000;

/// Default read size of the line input pump
pub const DEFAULT_INPUT_BLOCK: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Capacity of the host -> peer stream
    pub outbound_capacity: usize,

    /// Capacity of the peer -> host stream
    pub inbound_capacity: usize,

    /// Largest payload a single `submit` accepts
    pub max_submission: usize,

    /// Bytes the consumer dequeues per wake-up
    pub consumer_block: usize,

    /// How long the consumer waits for data before re-checking backpressure
    pub consumer_wait_ms: u64,

    /// Producer blocking budget; `None` waits until the bytes fit
    pub enqueue_timeout_ms: Option<u64>,

    /// Read size used when pumping the line input source
    pub input_block: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_STREAM_CAPACITY,
            inbound_capacity: DEFAULT_STREAM_CAPACITY,
            max_submission: DEFAULT_MAX_SUBMISSION,
            consumer_block: DEFAULT_CONSUMER_BLOCK,
            consumer_wait_ms: DEFAULT_CONSUMER_WAIT_MS,
            enqueue_timeout_ms: None,
            input_block: DEFAULT_INPUT_BLOCK,
        }
    }
}

impl LinkConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LinkError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate a config from TOML text. Missing keys keep defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| LinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.outbound_capacity < CHUNK_SIZE {
            return Err(LinkError::Config(format!(
                "outbound_capacity {} is smaller than one {}-byte chunk",
                self.outbound_capacity, CHUNK_SIZE
            )));
        }
        // Backpressure only clears once a whole chunk fits.
        if self.inbound_capacity < CHUNK_SIZE {
            return Err(LinkError::Config(format!(
                "inbound_capacity {} is smaller than one {}-byte chunk",
                self.inbound_capacity, CHUNK_SIZE
            )));
        }
        if self.max_submission == 0 {
            return Err(LinkError::Config("max_submission must be non-zero".into()));
        }
        // The handshake is only raised once a whole submission is queued.
        if self.max_submission > self.outbound_capacity {
            return Err(LinkError::Config(format!(
                "max_submission {} exceeds outbound_capacity {}",
                self.max_submission, self.outbound_capacity
            )));
        }
        if self.consumer_block == 0 {
            return Err(LinkError::Config("consumer_block must be non-zero".into()));
        }
        if self.consumer_wait_ms == 0 {
            return Err(LinkError::Config("consumer_wait_ms must be non-zero".into()));
        }
        if self.input_block == 0 {
            return Err(LinkError::Config("input_block must be non-zero".into()));
        }
        Ok(())
    }

    pub fn consumer_wait(&self) -> Duration {
        Duration::from_millis(self.consumer_wait_ms)
    }

    pub fn enqueue_timeout(&self) -> Option<Duration> {
        self.enqueue_timeout_ms.map(Duration::from_millis)
    }
}
