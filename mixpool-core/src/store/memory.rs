//! In-process store implementation.

use super::{Collection, Store, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-memory [`Store`] keeping each collection as an ordered list.
///
/// Replacing an existing key keeps its original position, so deposit
/// listings stay in first-registration order.
#[derive(Default)]
pub struct MemStore {
    collections: RwLock<HashMap<Collection, Vec<(String, Vec<u8>)>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|entries| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone()))
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection).or_default();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => entries.push((key.to_owned(), value)),
        }
        Ok(())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Vec<u8>>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|entries| entries.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(entries) = collections.get_mut(&collection) {
            entries.retain(|(k, _)| k != key);
        }
        Ok(())
    }
}
