//! Encryption-key bootstrapper.
//!
//! The compute network holds a one-time encryption key that participants
//! need before they can encrypt recipients. The bootstrapper is
//! responsible for:
//! - Checking the cache collection first
//! - Fetching the key from the compute network with bounded, exponentially
//!   backed-off attempts
//! - Persisting the key and broadcasting `PubKeyReady` on success
//! - Exposing an observable state (`Uncached -> Fetching -> Cached`, or
//!   `Unavailable` after exhausting attempts) for health checks
//!
//! Without the key the whole service is non-functional, so the server
//! re-enters bootstrap rounds while `Unavailable` instead of giving up for
//! good; within one round, callers block until the key arrives or the
//! attempt budget runs out.

use crate::clients::{ComputeClient, TaskOptions};
use crate::config::ConfigHandle;
use crate::entities::PubKeyData;
use crate::events::{EventHub, OperatorEvent};
use crate::store::{OperatorStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Observable bootstrap state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// No cached key and no fetch in progress.
    Uncached,
    /// A fetch round is in progress.
    Fetching,
    /// The key is cached; no further network contact happens.
    Cached,
    /// The last fetch round exhausted its attempt budget.
    Unavailable,
}

/// Errors surfaced by [`KeyBootstrapper::load_encryption_key`].
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The attempt budget ran out without obtaining a key.
    #[error("encryption key unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Obtains the encryption key from the compute network and caches it.
pub struct KeyBootstrapper {
    compute: Arc<dyn ComputeClient>,
    store: OperatorStore,
    hub: Arc<EventHub>,
    config: ConfigHandle,
    state_tx: watch::Sender<KeyState>,
    state_rx: watch::Receiver<KeyState>,
}

impl KeyBootstrapper {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        store: OperatorStore,
        hub: Arc<EventHub>,
        config: ConfigHandle,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(KeyState::Uncached);
        Self {
            compute,
            store,
            hub,
            config,
            state_tx,
            state_rx,
        }
    }

    /// The current bootstrap state, for health checks.
    pub fn state(&self) -> KeyState {
        *self.state_rx.borrow()
    }

    /// Subscribe to bootstrap state changes.
    pub fn watch_state(&self) -> watch::Receiver<KeyState> {
        self.state_rx.clone()
    }

    /// Return the encryption key, fetching and caching it on first use.
    ///
    /// Cache-first: once a key has been cached, the network is never
    /// contacted again. Otherwise this runs one bounded fetch round with
    /// exponential backoff between attempts; transient errors and
    /// not-ready (`None`) responses are logged and retried, never
    /// surfaced to the caller.
    pub async fn load_encryption_key(&self) -> Result<PubKeyData, KeyError> {
        if let Some(cached) = self.store.pub_key_data().await? {
            debug!("Encryption key served from cache");
            let _ = self.state_tx.send(KeyState::Cached);
            return Ok(cached);
        }

        let (retry, task_opts) = {
            let config = self.config.read().await;
            (
                config.key_retry,
                TaskOptions {
                    gas_limit: config.gas.default_task_limit,
                    gas_price: config.gas.default_task_price,
                },
            )
        };

        let _ = self.state_tx.send(KeyState::Fetching);
        info!(
            max_attempts = retry.max_attempts,
            "Fetching encryption key from the compute network"
        );

        for attempt in 0..retry.max_attempts {
            match self.compute.fetch_encryption_key(&task_opts).await {
                Ok(Some(key)) => {
                    self.store.cache_pub_key_data(&key).await?;
                    let _ = self.state_tx.send(KeyState::Cached);
                    info!("Encryption key cached");
                    self.hub.emit(OperatorEvent::PubKeyReady {
                        pub_key_data: key.clone(),
                    });
                    return Ok(key);
                }
                Ok(None) => {
                    debug!(attempt, "Encryption key not ready yet");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Encryption key fetch failed");
                }
            }
            if attempt + 1 < retry.max_attempts {
                tokio::time::sleep(retry.delay_after(attempt)).await;
            }
        }

        let _ = self.state_tx.send(KeyState::Unavailable);
        warn!(
            attempts = retry.max_attempts,
            "Encryption key unavailable, giving up this round"
        );
        Err(KeyError::Unavailable {
            attempts: retry.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::clients::ClientError;
    use crate::config::{KeyRetryConfig, MixConfig};
    use crate::events::Topic;
    use crate::store::MemStore;
    use crate::test_support::{MockCompute, pub_key, recorder};
    use std::sync::atomic::Ordering;

    fn fast_config(max_attempts: u32) -> ConfigHandle {
        let mut config = MixConfig::default();
        config.key_retry = KeyRetryConfig {
            base_delay_secs: 0,
            max_delay_secs: 0,
            max_attempts,
        };
        ConfigHandle::new(config)
    }

    fn bootstrapper(
        compute: Arc<MockCompute>,
        config: ConfigHandle,
    ) -> (KeyBootstrapper, Arc<EventHub>) {
        let hub = Arc::new(EventHub::new());
        let store = OperatorStore::new(Arc::new(MemStore::new()));
        (
            KeyBootstrapper::new(compute, store, hub.clone(), config),
            hub,
        )
    }

    #[tokio::test]
    async fn retries_until_key_arrives_then_serves_from_cache() {
        let compute = Arc::new(MockCompute::new());
        compute.script_key_fetches(vec![Ok(None), Ok(None), Ok(Some(pub_key()))]);

        let (keys, hub) = bootstrapper(compute.clone(), fast_config(8));
        let events = recorder(&hub);

        let key = keys.load_encryption_key().await.unwrap();
        assert_eq!(key, pub_key());
        assert_eq!(keys.state(), KeyState::Cached);
        assert_eq!(compute.key_calls.load(Ordering::SeqCst), 3);
        assert_eq!(events.topics(), vec![Topic::PubKeyReady]);

        // Second call is served from the cache without contacting the
        // network again.
        let again = keys.load_encryption_key().await.unwrap();
        assert_eq!(again, key);
        assert_eq!(compute.key_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_errors_are_swallowed_and_retried() {
        let compute = Arc::new(MockCompute::new());
        compute.script_key_fetches(vec![
            Err(ClientError::Transport("connection refused".into())),
            Ok(Some(pub_key())),
        ]);

        let (keys, _hub) = bootstrapper(compute.clone(), fast_config(8));
        let key = keys.load_encryption_key().await.unwrap();
        assert_eq!(key, pub_key());
        assert_eq!(compute.key_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_unavailable() {
        let compute = Arc::new(MockCompute::new());
        compute.script_key_fetches(vec![Ok(None), Ok(None), Ok(None)]);

        let (keys, hub) = bootstrapper(compute.clone(), fast_config(3));
        let events = recorder(&hub);

        let err = keys.load_encryption_key().await.unwrap_err();
        assert!(matches!(err, KeyError::Unavailable { attempts: 3 }));
        assert_eq!(keys.state(), KeyState::Unavailable);
        assert_eq!(compute.key_calls.load(Ordering::SeqCst), 3);
        assert!(events.topics().is_empty());
    }
}
