//! Domain entities persisted by the operator.

pub mod deal;
pub mod deposit;

pub use deal::Deal;
pub use deposit::Deposit;
pub use mixpool_sdk::objects::{DealStatus, DepositStatus};

use serde::{Deserialize, Serialize};

/// The compute network's one-time encryption key.
///
/// Fetched once per process lifetime under normal operation and cached in
/// the store; immutable after the first successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyData {
    pub public_key: Vec<u8>,
    /// Opaque task metadata returned alongside the key.
    pub metadata: serde_json::Value,
}

impl From<PubKeyData> for mixpool_sdk::objects::ws::PubKeyInfo {
    fn from(data: PubKeyData) -> Self {
        Self {
            public_key: data.public_key,
            metadata: data.metadata,
        }
    }
}
