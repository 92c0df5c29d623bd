//! Tunables for table dispatch and message recompilation.

use std::time::Duration;

use chain_sol::{Pubkey, COMPUTE_BUDGET_PROGRAM_ID, MAX_ADDRESSES_PER_EXTEND};
use serde::{Deserialize, Serialize};

use crate::error::{AltError, AltResult};

/// Addresses written per create/extend call.
pub const DEFAULT_CHUNK_SIZE: usize = 14;
/// Reads of the table before giving up on convergence.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 15;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
/// Percentage added to an existing compute unit limit.
pub const DEFAULT_COMPUTE_UNIT_BUMP_PERCENT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltConfig {
    pub chunk_size: usize,
    pub max_poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub compute_budget_program_id: Pubkey,
    pub compute_unit_bump_percent: u32,
}

impl Default for AltConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            compute_budget_program_id: COMPUTE_BUDGET_PROGRAM_ID,
            compute_unit_bump_percent: DEFAULT_COMPUTE_UNIT_BUMP_PERCENT,
        }
    }
}

impl AltConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> AltResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AltError::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AltResult<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_ADDRESSES_PER_EXTEND {
            return Err(AltError::InvalidConfig(format!(
                "chunk_size must be within 1..={MAX_ADDRESSES_PER_EXTEND}, got {}",
                self.chunk_size
            )));
        }
        if self.max_poll_attempts == 0 {
            return Err(AltError::InvalidConfig(
                "max_poll_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
