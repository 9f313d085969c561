//! Block-countdown scheduler.
//!
//! The scheduler is the sole driver of deal-lifecycle transitions. It is
//! responsible for:
//! - Polling the ledger height and computing blocks-remaining until the
//!   next allowed mix point
//! - Broadcasting a countdown tick on every poll
//! - Entering the deal lifecycle when the countdown expires, awaiting the
//!   full cycle before the next poll (a new check never starts while a
//!   cycle is in flight)
//! - Catching and logging every cycle error so a failed deal-execution
//!   attempt never kills the loop
//!
//! Modeled as an explicit lifecycle object (`Stopped`/`Running`): `tick()`
//! is one self-contained polling step, so a host can drive it from its own
//! timer, while [`run`](MixScheduler::run) provides the hosted loop with a
//! fixed poll interval and shutdown observed between iterations.

use crate::clients::{ClientError, LedgerClient, StateQuery};
use crate::config::ConfigHandle;
use crate::events::{EventHub, OperatorEvent};
use crate::lifecycle::DealLifecycle;
use crate::store::{OperatorStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Errors surfaced by a countdown refresh.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ClientError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Polls ledger height and triggers the deal lifecycle on expiry.
pub struct MixScheduler {
    ledger: Arc<dyn LedgerClient>,
    store: OperatorStore,
    hub: Arc<EventHub>,
    lifecycle: Arc<DealLifecycle>,
    config: ConfigHandle,
    state_tx: watch::Sender<SchedulerState>,
    state_rx: watch::Receiver<SchedulerState>,
    /// Operator-controlled pause switch; the hosted loop keeps polling the
    /// clock but skips countdown checks while inactive.
    active: AtomicBool,
}

impl MixScheduler {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: OperatorStore,
        hub: Arc<EventHub>,
        lifecycle: Arc<DealLifecycle>,
        config: ConfigHandle,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Stopped);
        Self {
            ledger,
            store,
            hub,
            lifecycle,
            config,
            state_tx,
            state_rx,
            active: AtomicBool::new(true),
        }
    }

    /// The current scheduler state, for health checks.
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Resume countdown checks.
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
        info!("Scheduler activated");
    }

    /// Pause countdown checks without stopping the hosted loop.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        info!("Scheduler deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Refresh the block countdown.
    ///
    /// `countdown = interval - (height - last_mix_block)`; the marker is
    /// seeded from the pooling contract's state on first use. Broadcasts a
    /// tick clamped at zero and returns the raw value, which drives the
    /// deadline decision.
    pub async fn refresh_countdown(&self) -> Result<i64, SchedulerError> {
        let height = self.ledger.get_height().await?;
        let last_mix_block = match self.store.last_mix_block().await? {
            Some(block) => block,
            None => {
                let state = self
                    .ledger
                    .query_contract_state(StateQuery::LastMixBlock)
                    .await?;
                let block = state.as_u64().unwrap_or(height);
                self.store.set_last_mix_block(block).await?;
                info!(block, "Seeded last-mix-block marker from contract state");
                block
            }
        };

        let interval = self.config.read().await.deal_interval_blocks;
        let countdown = interval as i64 - height.saturating_sub(last_mix_block) as i64;
        debug!(height, last_mix_block, countdown, "Block countdown");

        self.hub.emit(OperatorEvent::CountdownTick {
            blocks_remaining: countdown.max(0) as u64,
        });
        Ok(countdown)
    }

    /// One scheduling step: refresh the countdown and, when it has
    /// expired, run a full mix cycle. Never returns an error: failures
    /// are logged so the caller's loop survives them.
    pub async fn tick(&self) {
        match self.refresh_countdown().await {
            Ok(countdown) if countdown <= 0 => {
                debug!(countdown, "Countdown expired, entering mix cycle");
                if let Err(e) = self.lifecycle.run_mix_cycle().await {
                    error!(error = %e, "Mix cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Countdown refresh failed");
            }
        }
    }

    /// Hosted polling loop: tick, sleep the poll interval, repeat until
    /// shutdown is signaled. Shutdown is observed between iterations, so
    /// latency is bounded by one in-flight cycle plus the poll interval.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let _ = self.state_tx.send(SchedulerState::Running);
        info!("Scheduler started, watching blocks until deal");

        loop {
            if self.is_active() {
                self.tick().await;
            } else {
                debug!("Scheduler deactivated, skipping poll");
            }

            let poll_interval = self.config.read().await.poll_interval();
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        let _ = self.state_tx.send(SchedulerState::Stopped);
        info!("Scheduler shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::events::Topic;
    use crate::test_support::{Fixture, signed_payload};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn countdown_is_interval_minus_elapsed() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(90).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);

        // interval 20, elapsed 10.
        let countdown = fixture.scheduler.refresh_countdown().await.unwrap();
        assert_eq!(countdown, 10);
        assert_eq!(fixture.events.countdowns(), vec![10]);
    }

    #[tokio::test]
    async fn countdown_seeds_marker_from_contract_state() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.ledger.height.store(100, Ordering::SeqCst);
        fixture.ledger.contract_last_mix_block.store(95, Ordering::SeqCst);

        let countdown = fixture.scheduler.refresh_countdown().await.unwrap();
        assert_eq!(countdown, 15);
        assert_eq!(fixture.store.last_mix_block().await.unwrap(), Some(95));

        // Second refresh reads the stored marker, not the contract.
        let queries_before = fixture.ledger.state_queries.load(Ordering::SeqCst);
        fixture.scheduler.refresh_countdown().await.unwrap();
        assert_eq!(
            fixture.ledger.state_queries.load(Ordering::SeqCst),
            queries_before
        );
    }

    #[tokio::test]
    async fn negative_raw_countdown_is_reported_as_zero() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(50).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);

        let countdown = fixture.scheduler.refresh_countdown().await.unwrap();
        assert_eq!(countdown, -30);
        assert_eq!(fixture.events.countdowns(), vec![0]);
    }

    #[tokio::test]
    async fn expired_tick_runs_the_mix_cycle() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(50).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.register(signed_payload(0x22, 10)).await;
        fixture.events.clear();

        fixture.scheduler.tick().await;

        assert!(fixture.events.topics().contains(&Topic::DealCreated));
        assert!(fixture.events.topics().contains(&Topic::DealExecuted));
    }

    #[tokio::test]
    async fn unexpired_tick_leaves_the_registry_alone() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(100).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);
        fixture.register(signed_payload(0x11, 10)).await;
        fixture.register(signed_payload(0x22, 10)).await;

        fixture.scheduler.tick().await;

        assert!(fixture.store.deals().await.unwrap().is_empty());
        assert_eq!(fixture.registry.compute_quorum(0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ledger_failure_does_not_kill_the_tick() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.ledger.fail_height.store(true, Ordering::SeqCst);

        // Must not panic or propagate.
        fixture.scheduler.tick().await;
        assert!(fixture.events.topics().is_empty());
    }

    #[tokio::test]
    async fn deactivated_loop_skips_countdown_checks() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(50).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);
        fixture.scheduler.deactivate();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = fixture.scheduler.clone();
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // No ticks happened despite the expired countdown.
        assert!(fixture.events.countdowns().is_empty());

        fixture.scheduler.activate();
        assert!(fixture.scheduler.is_active());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let fixture = Fixture::with_threshold(2).await;
        fixture.store.set_last_mix_block(100).await.unwrap();
        fixture.ledger.height.store(100, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = fixture.scheduler.clone();
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        // Let the first tick land, then signal shutdown.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fixture.scheduler.state(), SchedulerState::Running);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(fixture.scheduler.state(), SchedulerState::Stopped);
    }
}
