//! Scripted capability doubles and fixtures shared by the unit tests.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::clients::{
    ClientError, ComputeClient, ExecutionReceipt, LedgerClient, LedgerReceipt, StateQuery,
    TaskOptions, TransactionPayload, TxOptions, VerificationReceipt,
};
use crate::config::{ConfigHandle, MixConfig};
use crate::entities::{Deal, Deposit, PubKeyData};
use crate::events::{EventHub, OperatorEvent, Topic};
use crate::lifecycle::DealLifecycle;
use crate::registry::DepositRegistry;
use crate::scheduler::MixScheduler;
use crate::store::{MemStore, OperatorStore};
use async_trait::async_trait;
use mixpool_sdk::objects::deposit::DepositPayload;
use mixpool_sdk::signature::{self, SigningKey};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Signed payload fixtures
// ---------------------------------------------------------------------------

pub fn signing_key(seed: u8) -> SigningKey {
    let mut bytes = [seed; 32];
    bytes[0] = 0x01;
    SigningKey::from_slice(&bytes).unwrap()
}

/// A correctly signed deposit payload whose sender is derived from the
/// seeded key.
pub fn signed_payload(seed: u8, amount: u128) -> DepositPayload {
    let key = signing_key(seed);
    let sender = signature::verifying_key_to_address(key.verifying_key());
    let enc_recipient = vec![seed; 70];
    let pub_key = vec![seed; 33];
    let sig = signature::sign_deposit(&key, &sender, amount, &enc_recipient, &pub_key).unwrap();
    DepositPayload {
        sender,
        amount,
        enc_recipient,
        pub_key,
        signature: sig,
    }
}

pub fn pub_key() -> PubKeyData {
    PubKeyData {
        public_key: vec![0x04; 64],
        metadata: serde_json::json!({"task": "key-bootstrap"}),
    }
}

// ---------------------------------------------------------------------------
// Event recorder
// ---------------------------------------------------------------------------

/// Records every event the hub delivers, across all topics.
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<OperatorEvent>>>,
}

impl EventRecorder {
    pub fn events(&self) -> Vec<OperatorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.events().iter().map(OperatorEvent::topic).collect()
    }

    /// The quorum values broadcast so far, in order.
    pub fn quorums(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OperatorEvent::QuorumChanged { quorum } => Some(quorum),
                _ => None,
            })
            .collect()
    }

    /// The countdown ticks broadcast so far, in order.
    pub fn countdowns(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OperatorEvent::CountdownTick { blocks_remaining } => Some(blocks_remaining),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// Subscribe a recorder to every topic of `hub`.
pub fn recorder(hub: &EventHub) -> EventRecorder {
    let recorder = EventRecorder {
        events: Arc::new(Mutex::new(Vec::new())),
    };
    for topic in Topic::ALL {
        let events = recorder.events.clone();
        hub.subscribe(topic, move |event| {
            events.lock().unwrap().push(event.clone());
        });
    }
    recorder
}

// ---------------------------------------------------------------------------
// Ledger double
// ---------------------------------------------------------------------------

pub struct MockLedger {
    pub height: AtomicU64,
    pub contract_last_mix_block: AtomicU64,
    pub state_queries: AtomicUsize,
    pub fail_height: AtomicBool,
    pub fail_submissions: AtomicBool,
    pub submissions: Mutex<Vec<(TransactionPayload, TxOptions)>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(100),
            contract_last_mix_block: AtomicU64::new(0),
            state_queries: AtomicUsize::new(0),
            fail_height: AtomicBool::new(false),
            fail_submissions: AtomicBool::new(false),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_height(&self) -> Result<u64, ClientError> {
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("ledger unreachable".into()));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn submit_transaction(
        &self,
        payload: TransactionPayload,
        opts: &TxOptions,
    ) -> Result<LedgerReceipt, ClientError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ClientError::Remote {
                code: -32000,
                message: "out of gas".into(),
            });
        }
        self.submissions.lock().unwrap().push((payload, *opts));
        Ok(LedgerReceipt(serde_json::json!({"tx": "0xfeed"})))
    }

    async fn query_contract_state(
        &self,
        _query: StateQuery,
    ) -> Result<serde_json::Value, ClientError> {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!(
            self.contract_last_mix_block.load(Ordering::SeqCst)
        ))
    }
}

// ---------------------------------------------------------------------------
// Compute double
// ---------------------------------------------------------------------------

pub struct MockCompute {
    /// Scripted key-fetch results, consumed front to back; once drained,
    /// further fetches return the default key.
    key_script: Mutex<VecDeque<Result<Option<PubKeyData>, ClientError>>>,
    pub key_calls: AtomicUsize,
    pub fail_executions: AtomicBool,
    pub executions: Mutex<Vec<(Uuid, TaskOptions)>>,
    pub verifications: Mutex<Vec<(usize, TaskOptions)>>,
}

impl MockCompute {
    pub fn new() -> Self {
        Self {
            key_script: Mutex::new(VecDeque::new()),
            key_calls: AtomicUsize::new(0),
            fail_executions: AtomicBool::new(false),
            executions: Mutex::new(Vec::new()),
            verifications: Mutex::new(Vec::new()),
        }
    }

    pub fn script_key_fetches(
        &self,
        results: Vec<Result<Option<PubKeyData>, ClientError>>,
    ) {
        *self.key_script.lock().unwrap() = results.into();
    }
}

#[async_trait]
impl ComputeClient for MockCompute {
    async fn fetch_encryption_key(
        &self,
        _opts: &TaskOptions,
    ) -> Result<Option<PubKeyData>, ClientError> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        match self.key_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Some(pub_key())),
        }
    }

    async fn submit_for_execution(
        &self,
        deal: &Deal,
        opts: &TaskOptions,
    ) -> Result<ExecutionReceipt, ClientError> {
        if self.fail_executions.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("compute network timeout".into()));
        }
        self.executions.lock().unwrap().push((deal.id, *opts));
        Ok(ExecutionReceipt(serde_json::json!({"task": deal.id})))
    }

    async fn submit_for_verification(
        &self,
        deposits: &[Deposit],
        opts: &TaskOptions,
    ) -> Result<VerificationReceipt, ClientError> {
        self.verifications
            .lock()
            .unwrap()
            .push((deposits.len(), *opts));
        Ok(VerificationReceipt(serde_json::json!({"verified": deposits.len()})))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A registry over a fresh in-memory store with default config.
pub async fn test_registry() -> (DepositRegistry, Arc<EventHub>) {
    let hub = Arc::new(EventHub::new());
    let store = OperatorStore::new(Arc::new(MemStore::new()));
    let config = ConfigHandle::new(MixConfig::default());
    (
        DepositRegistry::new(store, hub.clone(), config),
        hub,
    )
}

/// The full engine wired against scripted doubles.
pub struct Fixture {
    pub registry: Arc<DepositRegistry>,
    pub lifecycle: Arc<DealLifecycle>,
    pub scheduler: Arc<MixScheduler>,
    pub store: OperatorStore,
    pub ledger: Arc<MockLedger>,
    pub compute: Arc<MockCompute>,
    pub hub: Arc<EventHub>,
    pub config: ConfigHandle,
    pub events: EventRecorder,
}

impl Fixture {
    pub async fn with_threshold(threshold: usize) -> Self {
        let mut mix_config = MixConfig::default();
        mix_config.threshold = threshold;
        let config = ConfigHandle::new(mix_config);

        let hub = Arc::new(EventHub::new());
        let events = recorder(&hub);
        let store = OperatorStore::new(Arc::new(MemStore::new()));
        let ledger = Arc::new(MockLedger::new());
        let compute = Arc::new(MockCompute::new());

        let registry = Arc::new(DepositRegistry::new(
            store.clone(),
            hub.clone(),
            config.clone(),
        ));
        let lifecycle = Arc::new(DealLifecycle::new(
            registry.clone(),
            store.clone(),
            ledger.clone(),
            compute.clone(),
            hub.clone(),
            config.clone(),
        ));
        let scheduler = Arc::new(MixScheduler::new(
            ledger.clone(),
            store.clone(),
            hub.clone(),
            lifecycle.clone(),
            config.clone(),
        ));

        Self {
            registry,
            lifecycle,
            scheduler,
            store,
            ledger,
            compute,
            hub,
            config,
            events,
        }
    }

    /// Register a payload, panicking on rejection.
    pub async fn register(&self, payload: DepositPayload) -> Deposit {
        self.registry.register_deposit(payload).await.unwrap()
    }
}
