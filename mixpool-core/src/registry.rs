//! Quorum/deposit registry.
//!
//! The registry is responsible for:
//! - Verifying and persisting signed deposit submissions
//! - Serving fillable-deposit snapshots in registration order
//! - Computing the current quorum
//! - Marking deposits consumed when a deal is carved out
//!
//! Status mutations are serialized through a single writer lock; quorum is
//! computed from a snapshot read and needs no cross-record locking.

use crate::config::ConfigHandle;
use crate::entities::Deposit;
use crate::events::{EventHub, OperatorEvent};
use crate::store::{OperatorStore, StoreError};
use mixpool_sdk::objects::deposit::DepositPayload;
use mixpool_sdk::signature::{self, SignatureError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors surfaced to deposit submitters.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The recovered signer does not match the claimed sender, or the
    /// signature is malformed.
    #[error("invalid signature")]
    InvalidSignature(#[source] Option<SignatureError>),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Validates and stores deposit metadata; computes the fillable quorum.
pub struct DepositRegistry {
    store: OperatorStore,
    hub: Arc<EventHub>,
    config: ConfigHandle,
    /// Serializes status mutations (registration and consumption).
    write_lock: Mutex<()>,
}

impl DepositRegistry {
    pub fn new(store: OperatorStore, hub: Arc<EventHub>, config: ConfigHandle) -> Self {
        Self {
            store,
            hub,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Verify and persist a signed deposit submission.
    ///
    /// The signature must authenticate `(sender, amount, enc_recipient,
    /// pub_key)` against `sender`. On success the deposit is persisted as
    /// fillable and a quorum-changed event is broadcast.
    pub async fn register_deposit(
        &self,
        payload: DepositPayload,
    ) -> Result<Deposit, RegistryError> {
        let recovered = signature::recover_deposit_signer(
            &payload.signature,
            &payload.sender,
            payload.amount,
            &payload.enc_recipient,
            &payload.pub_key,
        )
        .map_err(|e| {
            warn!(sender = %payload.sender, error = %e, "Malformed deposit signature");
            RegistryError::InvalidSignature(Some(e))
        })?;

        if recovered != payload.sender {
            warn!(
                sender = %payload.sender,
                %recovered,
                "Deposit signature does not authenticate sender"
            );
            return Err(RegistryError::InvalidSignature(None));
        }

        let registered_at = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut deposit = Deposit::from_payload(payload, registered_at);
        deposit.make_fillable();

        let quorum = {
            let _guard = self.write_lock.lock().await;
            self.store.put_deposit(&deposit).await?;
            let minimum_amount = self.config.read().await.minimum_amount;
            self.compute_quorum(minimum_amount).await?
        };

        info!(
            sender = %deposit.sender,
            amount = deposit.amount,
            quorum,
            "Registered deposit"
        );
        self.hub.emit(OperatorEvent::QuorumChanged { quorum });

        Ok(deposit)
    }

    /// All fillable deposits with `amount >= minimum_amount`, in
    /// registration order.
    pub async fn fetch_fillable_deposits(
        &self,
        minimum_amount: u128,
    ) -> Result<Vec<Deposit>, RegistryError> {
        let deposits = self
            .store
            .deposits()
            .await?
            .into_iter()
            .filter(|d| d.is_fillable() && d.amount >= minimum_amount)
            .collect();
        Ok(deposits)
    }

    /// The number of fillable deposits at or above `minimum_amount`.
    pub async fn compute_quorum(&self, minimum_amount: u128) -> Result<usize, RegistryError> {
        Ok(self.fetch_fillable_deposits(minimum_amount).await?.len())
    }

    /// Transition the listed deposits to consumed. Idempotent: deposits
    /// already consumed (or no longer present) are skipped.
    pub async fn mark_consumed(&self, deposits: &[Deposit]) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        for deposit in deposits {
            match self.store.deposit(&deposit.storage_key()).await? {
                Some(mut stored) => {
                    if stored.status != crate::entities::DepositStatus::Consumed {
                        stored.consume();
                        self.store.put_deposit(&stored).await?;
                    }
                }
                None => {
                    debug!(key = %deposit.storage_key(), "Consume skipped, deposit not found");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::test_support::{recorder, signed_payload, test_registry};
    use mixpool_sdk::objects::DepositStatus;

    #[tokio::test]
    async fn valid_registration_is_fillable() {
        let (registry, hub) = test_registry().await;
        let quorums = recorder(&hub);

        let payload = signed_payload(0x11, 10);
        let deposit = registry.register_deposit(payload.clone()).await.unwrap();
        assert_eq!(deposit.status, DepositStatus::Fillable);

        let fillable = registry.fetch_fillable_deposits(10).await.unwrap();
        assert_eq!(fillable.len(), 1);
        assert_eq!(fillable[0].sender, payload.sender);
        assert_eq!(quorums.quorums(), vec![1]);
    }

    #[tokio::test]
    async fn forged_sender_is_rejected_and_not_persisted() {
        let (registry, _hub) = test_registry().await;

        let mut payload = signed_payload(0x11, 10);
        // Claim somebody else's address.
        payload.sender = signed_payload(0x22, 10).sender;

        let err = registry.register_deposit(payload).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSignature(_)));
        assert!(registry.fetch_fillable_deposits(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_signature_is_rejected() {
        let (registry, _hub) = test_registry().await;

        let mut payload = signed_payload(0x11, 10);
        payload.signature = vec![0u8; 65];

        let err = registry.register_deposit(payload).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn quorum_counts_only_deposits_at_or_above_minimum() {
        let (registry, _hub) = test_registry().await;

        registry
            .register_deposit(signed_payload(0x11, 5))
            .await
            .unwrap();
        registry
            .register_deposit(signed_payload(0x22, 10))
            .await
            .unwrap();
        registry
            .register_deposit(signed_payload(0x33, 20))
            .await
            .unwrap();

        assert_eq!(registry.compute_quorum(10).await.unwrap(), 2);
        assert_eq!(registry.compute_quorum(1).await.unwrap(), 3);
        assert_eq!(registry.compute_quorum(21).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fillable_order_is_registration_order() {
        let (registry, _hub) = test_registry().await;

        let first = registry
            .register_deposit(signed_payload(0x33, 10))
            .await
            .unwrap();
        let second = registry
            .register_deposit(signed_payload(0x11, 10))
            .await
            .unwrap();

        let fillable = registry.fetch_fillable_deposits(0).await.unwrap();
        assert_eq!(
            fillable.iter().map(|d| d.sender).collect::<Vec<_>>(),
            vec![first.sender, second.sender]
        );
    }

    #[tokio::test]
    async fn mark_consumed_is_idempotent() {
        let (registry, _hub) = test_registry().await;

        let a = registry
            .register_deposit(signed_payload(0x11, 10))
            .await
            .unwrap();
        let b = registry
            .register_deposit(signed_payload(0x22, 10))
            .await
            .unwrap();

        let batch = vec![a, b];
        registry.mark_consumed(&batch).await.unwrap();
        assert_eq!(registry.compute_quorum(0).await.unwrap(), 0);

        // A second pass neither errors nor changes anything.
        registry.mark_consumed(&batch).await.unwrap();
        assert_eq!(registry.compute_quorum(0).await.unwrap(), 0);
    }
}
