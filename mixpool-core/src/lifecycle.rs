//! Deal lifecycle state machine.
//!
//! Entered on every countdown expiry, the lifecycle is responsible for:
//! - Reading the fillable-deposit snapshot and deciding between the
//!   execute path (quorum met) and the verify-only path (quorum unmet)
//! - Advancing the last-mix-block marker before attempting deal creation
//! - Driving deal creation on the ledger, then confidential execution on
//!   the compute network, with a resource budget that scales linearly with
//!   participant count
//! - Resetting the quorum the instant a deal is carved out, independent of
//!   execution success
//!
//! Creation and execution failures are logged and dropped: there is no
//! retry and no rollback, so a failed execution leaves a `Created` deal
//! with no automated remediation. The verify-only path proves fillability
//! of sub-quorum deposits without committing a ledger transaction, keeping
//! idle-period costs near zero.

use crate::clients::{
    ComputeClient, LedgerClient, TaskOptions, TransactionPayload, TxOptions,
};
use crate::config::ConfigHandle;
use crate::entities::{Deal, Deposit};
use crate::events::{EventHub, OperatorEvent};
use crate::registry::{DepositRegistry, RegistryError};
use crate::store::{OperatorStore, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Errors that abort a mix cycle before any branch is taken.
///
/// Failures inside a branch (creation, execution, verification) are logged
/// and folded into the [`CycleOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] crate::clients::ClientError),
}

/// What a mix cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A deal was created and executed.
    Executed(Deal),
    /// A deal was created but its execution failed; it stays `Created`.
    CreatedOnly(Deal),
    /// The deal-creation transaction failed; the quorum was reset anyway.
    CreationFailed,
    /// Not enough equal-amount deposits; the verify-only path ran.
    QuorumNotReached { quorum: usize },
}

/// Drives deals through their creation/execution lifecycle.
pub struct DealLifecycle {
    registry: Arc<DepositRegistry>,
    store: OperatorStore,
    ledger: Arc<dyn LedgerClient>,
    compute: Arc<dyn ComputeClient>,
    hub: Arc<EventHub>,
    config: ConfigHandle,
}

impl DealLifecycle {
    pub fn new(
        registry: Arc<DepositRegistry>,
        store: OperatorStore,
        ledger: Arc<dyn LedgerClient>,
        compute: Arc<dyn ComputeClient>,
        hub: Arc<EventHub>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            registry,
            store,
            ledger,
            compute,
            hub,
            config,
        }
    }

    /// Run one mix cycle.
    ///
    /// The deposits batched into a deal must share one amount, since the
    /// protocol only mixes equal-amount deposits: the candidate batch is
    /// the largest equal-amount group of fillable deposits, earliest
    /// registration winning ties, and the threshold applies to that batch.
    pub async fn run_mix_cycle(&self) -> Result<CycleOutcome, LifecycleError> {
        let config = self.config.snapshot().await;
        let deposits = self
            .registry
            .fetch_fillable_deposits(config.minimum_amount)
            .await?;

        if deposits.is_empty() {
            debug!("No fillable deposits, nothing to mix or verify");
            self.hub.emit(OperatorEvent::QuorumNotReached);
            return Ok(CycleOutcome::QuorumNotReached { quorum: 0 });
        }

        let batch = largest_amount_batch(&deposits);

        if batch.len() < config.threshold {
            info!(
                quorum = batch.len(),
                threshold = config.threshold,
                "Quorum not reached, verifying deposits only"
            );
            let task_opts = TaskOptions {
                gas_limit: config.gas.default_task_limit,
                gas_price: config.gas.default_task_price,
            };
            match self
                .compute
                .submit_for_verification(&deposits, &task_opts)
                .await
            {
                Ok(receipt) => {
                    debug!(?receipt, "Deposits verified");
                    self.hub.emit(OperatorEvent::QuorumNotReached);
                }
                Err(e) => {
                    error!(error = %e, "Unable to verify deposits");
                }
            }
            return Ok(CycleOutcome::QuorumNotReached {
                quorum: batch.len(),
            });
        }

        info!(participants = batch.len(), amount = batch[0].amount, "Quorum reached");

        // Advance the mix marker first so a failed creation cannot cause an
        // immediate re-trigger on the next poll.
        let height = self.ledger.get_height().await?;
        self.store.set_last_mix_block(height).await?;

        let deal = self.create_deal(batch, &config.gas.tx_options()).await;

        // A new quorum cycle starts the instant a deal is carved out,
        // whatever happened on the ledger.
        self.hub.emit(OperatorEvent::QuorumChanged { quorum: 0 });

        let Some(mut deal) = deal else {
            return Ok(CycleOutcome::CreationFailed);
        };

        let task_opts = TaskOptions {
            gas_limit: config.gas.execute_base_limit
                + config.gas.execute_participant_limit * deal.deposits.len() as u64,
            gas_price: config.gas.execute_price,
        };
        match self.compute.submit_for_execution(&deal, &task_opts).await {
            Ok(receipt) => {
                deal.mark_executed(receipt);
                self.store.put_deal(&deal).await?;
                info!(deal_id = %deal.id, "Deal executed");
                self.hub.emit(OperatorEvent::DealExecuted { deal: deal.clone() });
                Ok(CycleOutcome::Executed(deal))
            }
            Err(e) => {
                error!(deal_id = %deal.id, error = %e, "Deal execution error");
                Ok(CycleOutcome::CreatedOnly(deal))
            }
        }
    }

    /// Submit the deal-creation transaction and persist the result.
    ///
    /// Returns `None` when the ledger transaction failed; the quorum reset
    /// and audit record still happen.
    async fn create_deal(&self, batch: Vec<Deposit>, tx_opts: &TxOptions) -> Option<Deal> {
        let deal_id = Uuid::new_v4();
        let amount = batch[0].amount;
        let created_at = time::OffsetDateTime::now_utc().unix_timestamp();
        let payload = TransactionPayload::CreateDeal {
            deal_id,
            amount,
            participants: batch.iter().map(|d| d.sender).collect(),
        };

        match self.ledger.submit_transaction(payload, tx_opts).await {
            Ok(receipt) => {
                let deal = Deal::created(deal_id, amount, batch, receipt, created_at);
                if let Err(e) = self.store.put_deal(&deal).await {
                    error!(deal_id = %deal.id, error = %e, "Unable to persist created deal");
                }
                if let Err(e) = self.registry.mark_consumed(&deal.deposits).await {
                    error!(deal_id = %deal.id, error = %e, "Unable to consume deal deposits");
                }
                info!(deal_id = %deal.id, participants = deal.deposits.len(), "Deal created");
                self.hub.emit(OperatorEvent::DealCreated { deal: deal.clone() });
                self.hub.emit(OperatorEvent::QuorumChanged { quorum: 0 });
                Some(deal)
            }
            Err(e) => {
                error!(error = %e, "Deal creation error");
                let failed = Deal::failed(deal_id, amount, batch, created_at);
                if let Err(e) = self.store.put_deal(&failed).await {
                    error!(deal_id = %deal_id, error = %e, "Unable to persist failed deal");
                }
                self.hub.emit(OperatorEvent::QuorumChanged { quorum: 0 });
                None
            }
        }
    }
}

/// The largest equal-amount group of `deposits`, preserving registration
/// order inside the group; the group whose first member registered
/// earliest wins ties.
fn largest_amount_batch(deposits: &[Deposit]) -> Vec<Deposit> {
    let mut buckets: Vec<(u128, Vec<Deposit>)> = Vec::new();
    for deposit in deposits {
        match buckets.iter_mut().find(|(amount, _)| *amount == deposit.amount) {
            Some((_, bucket)) => bucket.push(deposit.clone()),
            None => buckets.push((deposit.amount, vec![deposit.clone()])),
        }
    }
    let mut best: Vec<Deposit> = Vec::new();
    for (_, bucket) in buckets {
        if bucket.len() > best.len() {
            best = bucket;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::entities::DepositStatus;
    use crate::events::Topic;
    use crate::test_support::{Fixture, signed_payload};
    use mixpool_sdk::objects::DealStatus;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn below_threshold_takes_the_verification_path() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.events.clear();

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::QuorumNotReached { quorum: 1 });

        // One verification task, no ledger transaction, no deal.
        assert_eq!(fixture.compute.verifications.lock().unwrap().len(), 1);
        assert!(fixture.ledger.submissions.lock().unwrap().is_empty());
        assert!(fixture.store.deals().await.unwrap().is_empty());
        assert_eq!(fixture.events.topics(), vec![Topic::QuorumNotReached]);

        // The deposit is still fillable for the next cycle.
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn quorum_met_creates_and_executes_a_deal() {
        let fixture = Fixture::with_threshold(2).await;
        let a = fixture.register(signed_payload(0x11, 10)).await;
        let b = fixture.register(signed_payload(0x22, 10)).await;
        fixture.events.clear();

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        let CycleOutcome::Executed(deal) = outcome else {
            panic!("expected an executed deal, got {outcome:?}");
        };

        // The deal references both deposits in registration order.
        assert_eq!(deal.amount, 10);
        assert_eq!(
            deal.deposits.iter().map(|d| d.sender).collect::<Vec<_>>(),
            vec![a.sender, b.sender]
        );
        assert_eq!(deal.status, DealStatus::Executed);

        // Constituents are consumed and the quorum reports 0.
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 0);
        for deposit in &deal.deposits {
            let stored = fixture
                .store
                .deposit(&deposit.storage_key())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.status, DepositStatus::Consumed);
        }

        // The mix marker advanced to the current height before creation.
        assert_eq!(fixture.store.last_mix_block().await.unwrap(), Some(100));

        // Event order: created, quorum reset (twice, once per step), executed.
        assert_eq!(
            fixture.events.topics(),
            vec![
                Topic::DealCreated,
                Topic::QuorumChanged,
                Topic::QuorumChanged,
                Topic::DealExecuted,
            ]
        );
        assert_eq!(fixture.events.quorums(), vec![0, 0]);

        // Execution budget scales with the participant count.
        let executions = fixture.compute.executions.lock().unwrap();
        assert_eq!(executions.len(), 1);
        let gas = fixture.config.snapshot().await.gas;
        assert_eq!(
            executions[0].1.gas_limit,
            gas.execute_base_limit + 2 * gas.execute_participant_limit
        );
    }

    #[tokio::test]
    async fn sub_threshold_then_threshold_scenario() {
        let fixture = Fixture::with_threshold(2).await;

        fixture.register(signed_payload(0x11, 10)).await;
        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::QuorumNotReached { quorum: 1 });

        fixture.register(signed_payload(0x22, 10)).await;
        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Executed(_)));
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn creation_failure_resets_quorum_and_skips_execution() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.register(signed_payload(0x22, 10)).await;
        fixture.events.clear();
        fixture.ledger.fail_submissions.store(true, Ordering::SeqCst);

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::CreationFailed);

        // No execution attempt, no consumed deposits, quorum still resets.
        assert!(fixture.compute.executions.lock().unwrap().is_empty());
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 2);
        assert_eq!(
            fixture.events.topics(),
            vec![Topic::QuorumChanged, Topic::QuorumChanged]
        );

        // The failure left an audit record.
        let deals = fixture.store.deals().await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].status, DealStatus::Failed);

        // The mix marker still advanced.
        assert_eq!(fixture.store.last_mix_block().await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn execution_failure_leaves_the_deal_created() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.register(signed_payload(0x22, 10)).await;
        fixture.events.clear();
        fixture.compute.fail_executions.store(true, Ordering::SeqCst);

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        let CycleOutcome::CreatedOnly(deal) = outcome else {
            panic!("expected a created-only deal");
        };
        assert_eq!(deal.status, DealStatus::Created);

        // Stored deal still reads Created; no DealExecuted broadcast.
        let stored = fixture.store.deal(deal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DealStatus::Created);
        assert!(!fixture.events.topics().contains(&Topic::DealExecuted));

        // Deposits stay consumed: no rollback.
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_registry_skips_the_compute_call() {
        let fixture = Fixture::with_threshold(2).await;

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::QuorumNotReached { quorum: 0 });
        assert!(fixture.compute.verifications.lock().unwrap().is_empty());
        assert_eq!(fixture.events.topics(), vec![Topic::QuorumNotReached]);
    }

    #[tokio::test]
    async fn heterogeneous_amounts_batch_by_amount() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.register(signed_payload(0x22, 25)).await;
        fixture.register(signed_payload(0x33, 10)).await;
        fixture.events.clear();

        let outcome = fixture.lifecycle.run_mix_cycle().await.unwrap();
        let CycleOutcome::Executed(deal) = outcome else {
            panic!("expected an executed deal");
        };

        // Only the amount-10 group is batched; the 25 deposit stays
        // fillable for a later cycle.
        assert_eq!(deal.amount, 10);
        assert_eq!(deal.deposits.len(), 2);
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 1);
    }

    #[test]
    fn largest_batch_prefers_earliest_on_ties() {
        let mk = |seed: u8, amount: u128| {
            let payload = signed_payload(seed, amount);
            let mut deposit = Deposit::from_payload(payload, 0);
            deposit.make_fillable();
            deposit
        };
        let deposits = vec![mk(0x11, 7), mk(0x22, 9), mk(0x33, 7), mk(0x44, 9)];
        let batch = largest_amount_batch(&deposits);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].amount, 7);
    }
}
