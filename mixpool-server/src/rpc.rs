//! JSON-RPC adapters for the ledger and compute-network capabilities.
//!
//! The engine only knows the `LedgerClient`/`ComputeClient` traits; these
//! implementations speak JSON-RPC 2.0 over HTTP to the ledger node and the
//! compute-network gateway named in the configuration.

use async_trait::async_trait;
use mixpool_core::clients::{
    ClientError, ComputeClient, ExecutionReceipt, LedgerClient, LedgerReceipt, StateQuery,
    TaskOptions, TransactionPayload, TxOptions, VerificationReceipt,
};
use mixpool_core::entities::{Deal, Deposit, PubKeyData};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// A JSON-RPC 2.0 client over HTTP.
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ClientError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ClientError::Malformed("response carries neither result nor error".into()))
    }
}

/// Ledger capability over JSON-RPC.
pub struct HttpLedgerClient {
    rpc: JsonRpcClient,
    contract: String,
}

impl HttpLedgerClient {
    pub fn new(url: Url, contract: String) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
            contract,
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_height(&self) -> Result<u64, ClientError> {
        let result = self.rpc.call("chain_getHeight", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| ClientError::Malformed(format!("height is not an integer: {result}")))
    }

    async fn submit_transaction(
        &self,
        payload: TransactionPayload,
        opts: &TxOptions,
    ) -> Result<LedgerReceipt, ClientError> {
        let result = self
            .rpc
            .call(
                "chain_submitTransaction",
                json!([{
                    "to": self.contract,
                    "payload": payload,
                    "gas_limit": opts.gas_limit,
                    "gas_price": opts.gas_price,
                }]),
            )
            .await?;
        Ok(LedgerReceipt(result))
    }

    async fn query_contract_state(
        &self,
        query: StateQuery,
    ) -> Result<serde_json::Value, ClientError> {
        self.rpc
            .call(
                "chain_queryState",
                json!([{ "contract": self.contract, "query": query }]),
            )
            .await
    }
}

/// Compute-network capability over JSON-RPC.
pub struct HttpComputeClient {
    rpc: JsonRpcClient,
    contract: String,
}

impl HttpComputeClient {
    pub fn new(url: Url, contract: String) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
            contract,
        }
    }

    fn task_params(&self, opts: &TaskOptions) -> serde_json::Value {
        json!({
            "contract": self.contract,
            "gas_limit": opts.gas_limit,
            "gas_price": opts.gas_price,
        })
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn fetch_encryption_key(
        &self,
        opts: &TaskOptions,
    ) -> Result<Option<PubKeyData>, ClientError> {
        let result = self
            .rpc
            .call("compute_getEncryptionKey", json!([self.task_params(opts)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ClientError::Malformed(e.to_string()))
    }

    async fn submit_for_execution(
        &self,
        deal: &Deal,
        opts: &TaskOptions,
    ) -> Result<ExecutionReceipt, ClientError> {
        let enc_recipients: Vec<String> = deal
            .deposits
            .iter()
            .map(|d| format!("0x{}", hex::encode(&d.enc_recipient)))
            .collect();
        let result = self
            .rpc
            .call(
                "compute_executeDeal",
                json!([{
                    "task": self.task_params(opts),
                    "deal_id": deal.id,
                    "nb_recipients": deal.deposits.len(),
                    "enc_recipients": enc_recipients,
                }]),
            )
            .await?;
        Ok(ExecutionReceipt(result))
    }

    async fn submit_for_verification(
        &self,
        deposits: &[Deposit],
        opts: &TaskOptions,
    ) -> Result<VerificationReceipt, ClientError> {
        let entries: Vec<serde_json::Value> = deposits
            .iter()
            .map(|d| {
                json!({
                    "sender": d.sender,
                    "amount": d.amount.to_string(),
                })
            })
            .collect();
        let result = self
            .rpc
            .call(
                "compute_verifyDeposits",
                json!([{ "task": self.task_params(opts), "deposits": entries }]),
            )
            .await?;
        Ok(VerificationReceipt(result))
    }
}
