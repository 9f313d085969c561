//! Mixpool Operator Server
//!
//! Coordinates a multi-party value-pooling protocol: participants register
//! encrypted deposit metadata over WebSocket, and once enough equal-amount
//! deposits are fillable and the block countdown expires, the operator
//! batches them into a deal, commits it on the ledger, and submits it for
//! confidential execution on the compute network.

mod api;
mod config;
mod rpc;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use mixpool_core::config::ConfigHandle;
use mixpool_core::events::{EventHub, OperatorEvent, Topic};
use mixpool_core::keys::{KeyBootstrapper, KeyError};
use mixpool_core::lifecycle::DealLifecycle;
use mixpool_core::registry::DepositRegistry;
use mixpool_core::scheduler::MixScheduler;
use mixpool_core::store::{MemStore, OperatorStore};
use mixpool_sdk::objects::deal::DealRecord;
use mixpool_sdk::objects::ws::WsServerMessage;
use rpc::{HttpComputeClient, HttpLedgerClient};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use state::{AppState, ContractInfo};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the fan-out channel feeding WebSocket sessions.
const EVENTS_CHANNEL_CAPACITY: usize = 256;

/// Mixpool - confidential value-pooling operator
#[derive(Parser, Debug)]
#[command(name = "mixpool-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./mixpool-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:8547)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting mixpool-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded.listen;
    let contracts = Arc::new(ContractInfo {
        ledger_contract: loaded.ledger_contract.clone(),
        compute_contract: loaded.compute_contract.clone(),
    });
    let config = ConfigHandle::new(loaded.mix);

    // Capabilities: storage and the two external networks.
    let store = OperatorStore::new(Arc::new(MemStore::new()));
    let ledger = Arc::new(HttpLedgerClient::new(
        loaded.ledger_rpc_url.clone(),
        loaded.ledger_contract.clone(),
    ));
    let compute = Arc::new(HttpComputeClient::new(
        loaded.compute_rpc_url.clone(),
        loaded.compute_contract.clone(),
    ));

    // The event hub feeds a broadcast channel consumed by every WebSocket
    // session; the send never blocks the emitting component.
    let hub = Arc::new(EventHub::new());
    let (events_tx, _) = broadcast::channel(EVENTS_CHANNEL_CAPACITY);
    bridge_events(&hub, events_tx.clone());

    // The orchestration engine.
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
        ledger,
        store.clone(),
        hub.clone(),
        lifecycle,
        config.clone(),
    ));
    let keys = Arc::new(KeyBootstrapper::new(
        compute,
        store.clone(),
        hub.clone(),
        config.clone(),
    ));

    // Key bootstrap gates scheduler activation: no deals can be built
    // before participants can encrypt recipients.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestration = tokio::spawn(bootstrap_then_schedule(
        keys.clone(),
        scheduler.clone(),
        config.clone(),
        shutdown_rx,
    ));

    let reload_notify = spawn_config_reload_handler(config.clone(), config_loader, hub.clone());

    let app_state = AppState {
        registry,
        scheduler,
        keys,
        hub,
        store,
        config,
        contracts,
        events_tx,
    };
    let router = build_router(app_state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop the background tasks and wait for the scheduler to park.
    let _ = shutdown_tx.send(true);
    reload_notify.notify_one();
    if let Err(e) = orchestration.await {
        tracing::error!(error = %e, "Orchestration task panicked");
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Bootstrap the encryption key, then run the scheduler loop.
///
/// Each bootstrap round is bounded; when a round exhausts its attempts the
/// bootstrapper reports `Unavailable` (visible in `/health`) and another
/// round starts after a pause. The scheduler only ever runs with a cached
/// key.
async fn bootstrap_then_schedule(
    keys: Arc<KeyBootstrapper>,
    scheduler: Arc<MixScheduler>,
    config: ConfigHandle,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match keys.load_encryption_key().await {
            Ok(_) => break,
            Err(e @ KeyError::Unavailable { .. }) => {
                tracing::warn!(error = %e, "Key bootstrap round failed, pausing before retry");
            }
            Err(e) => {
                tracing::error!(error = %e, "Key bootstrap hit a storage error");
            }
        }

        let pause = {
            let config = config.read().await;
            std::time::Duration::from_secs(config.key_retry.max_delay_secs.max(1))
        };
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Shutdown before key bootstrap completed");
                    return;
                }
            }

            _ = tokio::time::sleep(pause) => {}
        }
    }

    scheduler.run(shutdown_rx).await;
}

/// Forward every engine event into the WebSocket fan-out channel.
///
/// Handlers run synchronously inside the emitting call, so they only do a
/// non-blocking broadcast send; a send error just means no client is
/// connected.
fn bridge_events(hub: &EventHub, events_tx: broadcast::Sender<WsServerMessage>) {
    for topic in Topic::ALL {
        let events_tx = events_tx.clone();
        hub.subscribe(topic, move |event| {
            let _ = events_tx.send(to_ws_message(event));
        });
    }
}

fn to_ws_message(event: &OperatorEvent) -> WsServerMessage {
    match event {
        OperatorEvent::PubKeyReady { pub_key_data } => WsServerMessage::PubKeyReady {
            pub_key_data: pub_key_data.clone().into(),
        },
        OperatorEvent::DealCreated { deal } => WsServerMessage::DealCreated {
            deal: DealRecord::from(deal),
        },
        OperatorEvent::DealExecuted { deal } => WsServerMessage::DealExecuted {
            deal: DealRecord::from(deal),
        },
        OperatorEvent::QuorumChanged { quorum } => {
            WsServerMessage::QuorumChanged { quorum: *quorum }
        }
        OperatorEvent::QuorumNotReached => WsServerMessage::QuorumNotReached,
        OperatorEvent::CountdownTick { blocks_remaining } => WsServerMessage::CountdownTick {
            blocks_remaining: *blocks_remaining,
        },
        OperatorEvent::ThresholdInfo { threshold } => WsServerMessage::ThresholdInfo {
            threshold: *threshold,
        },
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mixpool_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
