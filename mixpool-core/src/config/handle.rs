//! Shared config handle with change notification.
//!
//! Wraps the runtime [`MixConfig`] behind `Arc<RwLock<_>>` with a
//! watch-based notification mechanism so long-running components can react
//! to reloads (SIGHUP) without polling.

use super::MixConfig;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, watch};

/// A shared, watchable handle to the runtime mixing configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<MixConfig>,
    version_tx: watch::Sender<u64>,
}

/// Receives notifications when a [`ConfigHandle`] is updated.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl ConfigHandle {
    pub fn new(initial: MixConfig) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(initial),
                version_tx,
            }),
        }
    }

    /// Read the current configuration.
    pub async fn read(&self) -> RwLockReadGuard<'_, MixConfig> {
        self.inner.config.read().await
    }

    /// Snapshot the current configuration.
    pub async fn snapshot(&self) -> MixConfig {
        self.inner.config.read().await.clone()
    }

    /// Replace the configuration and notify all watchers.
    pub async fn update(&self, config: MixConfig) {
        {
            let mut guard = self.inner.config.write().await;
            *guard = config;
        }
        self.inner.version_tx.send_modify(|version| *version += 1);
    }

    /// Subscribe to reload notifications.
    pub fn watch(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl ConfigWatcher {
    /// Wait until the configuration is updated.
    ///
    /// Returns `Err` if the [`ConfigHandle`] has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn update_notifies_watchers() {
        let handle = ConfigHandle::new(MixConfig::default());
        let mut watcher = handle.watch();

        let mut updated = MixConfig::default();
        updated.threshold = 5;
        handle.update(updated).await;

        watcher.changed().await.unwrap();
        assert_eq!(handle.read().await.threshold, 5);
    }
}
