//! Runtime configuration for the orchestration engine.
//!
//! The actual file loading/parsing is handled by the server crate; this
//! module defines the validated runtime values and the shared
//! [`ConfigHandle`] that propagates reloads to running components.

mod handle;

pub use handle::{ConfigHandle, ConfigWatcher};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gas/resource schedule for ledger transactions and compute tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Limit for ordinary compute tasks (key fetch, verification).
    pub default_task_limit: u64,
    /// Price for ordinary compute tasks.
    pub default_task_price: u64,
    /// Base limit for a deal-execution task.
    pub execute_base_limit: u64,
    /// Additional limit per participant in a deal-execution task.
    pub execute_participant_limit: u64,
    /// Price for deal-execution tasks.
    pub execute_price: u64,
    /// Limit for ledger transactions.
    pub tx_limit: u64,
    /// Price for ledger transactions.
    pub tx_price: u64,
}

impl GasSchedule {
    /// Options for ledger transactions.
    pub fn tx_options(&self) -> crate::clients::TxOptions {
        crate::clients::TxOptions {
            gas_limit: self.tx_limit,
            gas_price: self.tx_price,
        }
    }
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            default_task_limit: 4_712_388,
            default_task_price: 1_000_000,
            execute_base_limit: 3_000_000,
            execute_participant_limit: 24_000_000,
            execute_price: 1_000_000,
            tx_limit: 100_712_388,
            tx_price: 100_000_000_000,
        }
    }
}

/// Retry policy for the encryption-key bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRetryConfig {
    /// Delay before the second attempt; doubles each attempt.
    pub base_delay_secs: u64,
    /// Upper bound on the per-attempt delay.
    pub max_delay_secs: u64,
    /// Attempts before the bootstrapper reports `Unavailable`.
    pub max_attempts: u32,
}

impl Default for KeyRetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 10,
            max_delay_secs: 120,
            max_attempts: 8,
        }
    }
}

impl KeyRetryConfig {
    /// Delay to sleep after the given zero-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.min(32);
        let secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exp.min(63))
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

/// The operator's mixing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixConfig {
    /// Fillable deposits required to trigger deal creation.
    pub threshold: usize,
    /// Smallest deposit amount counted toward the quorum.
    #[serde(with = "mixpool_sdk::objects::amount_str")]
    pub minimum_amount: u128,
    /// Blocks between allowed mix points.
    pub deal_interval_blocks: u64,
    /// Countdown poll interval, in seconds.
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub key_retry: KeyRetryConfig,
    #[serde(default)]
    pub gas: GasSchedule,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            minimum_amount: 1,
            deal_interval_blocks: 20,
            poll_interval_secs: 10,
            key_retry: KeyRetryConfig::default(),
            gas: GasSchedule::default(),
        }
    }
}

impl MixConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_retry_backoff_doubles_and_caps() {
        let retry = KeyRetryConfig {
            base_delay_secs: 10,
            max_delay_secs: 120,
            max_attempts: 8,
        };
        assert_eq!(retry.delay_after(0), Duration::from_secs(10));
        assert_eq!(retry.delay_after(1), Duration::from_secs(20));
        assert_eq!(retry.delay_after(2), Duration::from_secs(40));
        assert_eq!(retry.delay_after(4), Duration::from_secs(120));
        assert_eq!(retry.delay_after(63), Duration::from_secs(120));
    }

    #[test]
    fn execution_gas_scales_with_participants() {
        let gas = GasSchedule::default();
        let budget = gas.execute_base_limit + 3 * gas.execute_participant_limit;
        assert_eq!(budget, 75_000_000);
    }
}
