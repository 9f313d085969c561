//! TOML file configuration structures.

use mixpool_core::config::{GasSchedule, KeyRetryConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Top-level structure of the `mixpool-config.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerSection,
    pub ledger: LedgerSection,
    pub compute: ComputeSection,
    #[serde(default)]
    pub mix: MixSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Listen address for the HTTP/WebSocket server.
    pub listen: SocketAddr,
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: Url,
    /// Address of the pooling contract on the ledger.
    pub contract: String,
}

/// `[compute]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSection {
    /// JSON-RPC endpoint of the compute-network gateway.
    pub rpc_url: Url,
    /// Address of the confidential contract on the compute network.
    pub contract: String,
}

/// `[mix]` section, mapping onto the runtime `MixConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSection {
    pub threshold: usize,
    /// Smallest deposit amount counted toward the quorum, as a decimal
    /// string in the ledger's smallest unit.
    pub minimum_amount: String,
    pub deal_interval_blocks: u64,
    pub poll_interval_secs: u64,
    pub key_retry: KeyRetryConfig,
    pub gas: GasSchedule,
}

impl Default for MixSection {
    fn default() -> Self {
        let defaults = mixpool_core::config::MixConfig::default();
        Self {
            threshold: defaults.threshold,
            minimum_amount: defaults.minimum_amount.to_string(),
            deal_interval_blocks: defaults.deal_interval_blocks,
            poll_interval_secs: defaults.poll_interval_secs,
            key_retry: defaults.key_retry,
            gas: defaults.gas,
        }
    }
}
