//! External-capability seams: the ledger client and the compute-network
//! client.
//!
//! The orchestration engine only ever talks to these traits. Transport,
//! transaction construction, and consensus live behind them; the server
//! crate provides JSON-RPC implementations, tests provide scripted doubles.

use crate::entities::{Deal, Deposit, PubKeyData};
use async_trait::async_trait;
use mixpool_sdk::objects::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors surfaced by the external clients.
///
/// Everything here is transient from the orchestrator's point of view: the
/// lifecycle logs these and moves on, the key bootstrapper retries them.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connection refused, timeout, TLS, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote endpoint returned a structured error.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Gas/resource options for a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    pub gas_limit: u64,
    pub gas_price: u64,
}

/// Gas/resource options for a compute-network task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub gas_limit: u64,
    pub gas_price: u64,
}

/// A transaction submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionPayload {
    /// Commit a new deal referencing the given participants.
    CreateDeal {
        deal_id: Uuid,
        #[serde(with = "mixpool_sdk::objects::amount_str")]
        amount: u128,
        participants: Vec<Address>,
    },
}

/// A read-only query against the pooling contract's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateQuery {
    /// The block height of the last executed mix.
    LastMixBlock,
}

/// Opaque receipt for a ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerReceipt(pub serde_json::Value);

/// Opaque receipt for a confidential execution task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionReceipt(pub serde_json::Value);

/// Opaque receipt for a deposit-verification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationReceipt(pub serde_json::Value);

/// The append-only transactional ledger recording deposits and deal
/// settlement.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current chain height.
    async fn get_height(&self) -> Result<u64, ClientError>;

    /// Submit a transaction and wait for its receipt.
    async fn submit_transaction(
        &self,
        payload: TransactionPayload,
        opts: &TxOptions,
    ) -> Result<LedgerReceipt, ClientError>;

    /// Query the pooling contract's state.
    async fn query_contract_state(
        &self,
        query: StateQuery,
    ) -> Result<serde_json::Value, ClientError>;
}

/// The confidential-execution network that performs the mixing computation
/// and holds the encryption key.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Retrieve the network's encryption key. `None` means the key task has
    /// not completed yet and the caller should try again later.
    async fn fetch_encryption_key(
        &self,
        opts: &TaskOptions,
    ) -> Result<Option<PubKeyData>, ClientError>;

    /// Submit a created deal for confidential execution.
    async fn submit_for_execution(
        &self,
        deal: &Deal,
        opts: &TaskOptions,
    ) -> Result<ExecutionReceipt, ClientError>;

    /// Prove fillability of sub-quorum deposits without creating a deal.
    async fn submit_for_verification(
        &self,
        deposits: &[Deposit],
        opts: &TaskOptions,
    ) -> Result<VerificationReceipt, ClientError>;
}
