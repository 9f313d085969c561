//! Application state shared across all request handlers.

use mixpool_core::config::ConfigHandle;
use mixpool_core::events::EventHub;
use mixpool_core::keys::KeyBootstrapper;
use mixpool_core::registry::DepositRegistry;
use mixpool_core::scheduler::MixScheduler;
use mixpool_core::store::OperatorStore;
use mixpool_sdk::objects::ws::WsServerMessage;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Contract addresses surfaced to clients via `fetch_config`.
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub ledger_contract: String,
    pub compute_contract: String,
}

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DepositRegistry>,
    pub scheduler: Arc<MixScheduler>,
    pub keys: Arc<KeyBootstrapper>,
    pub hub: Arc<EventHub>,
    pub store: OperatorStore,
    pub config: ConfigHandle,
    pub contracts: Arc<ContractInfo>,
    /// Fan-out channel feeding every WebSocket session.
    pub events_tx: broadcast::Sender<WsServerMessage>,
}
