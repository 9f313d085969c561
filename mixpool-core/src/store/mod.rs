//! Storage capability.
//!
//! Persistence is an external concern: the engine speaks to a [`Store`] of
//! ordered key/value collections and never to a concrete database. The
//! typed [`OperatorStore`] wrapper handles the serde codec and the
//! well-known keys; [`MemStore`] is the in-process implementation.

pub mod memory;

pub use memory::MemStore;

use crate::entities::{Deal, Deposit, PubKeyData};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// The named collections the operator persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Deposits,
    Deals,
    Cache,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Deposits => "deposits",
            Collection::Deals => "deals",
            Collection::Cache => "cache",
        }
    }
}

/// Cache-collection key for the encryption key singleton.
const PUB_KEY_CACHE_KEY: &str = "pub_key_data";
/// Cache-collection key for the last-mix block marker.
const LAST_MIX_BLOCK_KEY: &str = "last_mix_block";

/// Errors surfaced by the storage capability.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Ordered key/value storage over named collections.
///
/// `list` returns values in insertion order; replacing an existing key
/// keeps its original position. Deal composition depends on this ordering.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), StoreError>;

    async fn list(&self, collection: Collection) -> Result<Vec<Vec<u8>>, StoreError>;

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError>;
}

/// Typed access to the operator's collections.
#[derive(Clone)]
pub struct OperatorStore {
    inner: Arc<dyn Store>,
}

impl OperatorStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }

    // -- Deposits -----------------------------------------------------------

    pub async fn deposit(&self, key: &str) -> Result<Option<Deposit>, StoreError> {
        decode_opt(self.inner.get(Collection::Deposits, key).await?)
    }

    pub async fn put_deposit(&self, deposit: &Deposit) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(deposit)?;
        self.inner
            .put(Collection::Deposits, &deposit.storage_key(), bytes)
            .await
    }

    /// All deposits in registration order.
    pub async fn deposits(&self) -> Result<Vec<Deposit>, StoreError> {
        self.inner
            .list(Collection::Deposits)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    // -- Deals --------------------------------------------------------------

    pub async fn deal(&self, id: Uuid) -> Result<Option<Deal>, StoreError> {
        decode_opt(self.inner.get(Collection::Deals, &id.to_string()).await?)
    }

    pub async fn put_deal(&self, deal: &Deal) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(deal)?;
        self.inner
            .put(Collection::Deals, &deal.storage_key(), bytes)
            .await
    }

    /// All deals in creation order.
    pub async fn deals(&self) -> Result<Vec<Deal>, StoreError> {
        self.inner
            .list(Collection::Deals)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    // -- Cache --------------------------------------------------------------

    pub async fn pub_key_data(&self) -> Result<Option<PubKeyData>, StoreError> {
        decode_opt(self.inner.get(Collection::Cache, PUB_KEY_CACHE_KEY).await?)
    }

    pub async fn cache_pub_key_data(&self, data: &PubKeyData) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(data)?;
        self.inner
            .put(Collection::Cache, PUB_KEY_CACHE_KEY, bytes)
            .await
    }

    pub async fn last_mix_block(&self) -> Result<Option<u64>, StoreError> {
        decode_opt(
            self.inner
                .get(Collection::Cache, LAST_MIX_BLOCK_KEY)
                .await?,
        )
    }

    pub async fn set_last_mix_block(&self, block: u64) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&block)?;
        self.inner
            .put(Collection::Cache, LAST_MIX_BLOCK_KEY, bytes)
            .await
    }
}

fn decode_opt<T: serde::de::DeserializeOwned>(
    bytes: Option<Vec<u8>>,
) -> Result<Option<T>, StoreError> {
    match bytes {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
