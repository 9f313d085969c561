//! WebSocket protocol for the operator service.
//!
//! The `GET /ws` endpoint upgrades to a WebSocket connection over which the
//! operator both answers client requests and pushes state transitions.
//!
//! # Protocol
//!
//! 1. On connect the server sends [`WsServerMessage::ThresholdInfo`], the
//!    current [`WsServerMessage::QuorumChanged`], and (once the encryption
//!    key is cached) [`WsServerMessage::PubKeyReady`].
//! 2. The client sends [`WsClientMessage`] frames; each request produces a
//!    direct response frame.
//! 3. Broadcast frames (`QuorumChanged`, `DealCreated`, `DealExecuted`,
//!    `QuorumNotReached`, `CountdownTick`) arrive interleaved with
//!    responses whenever the orchestration engine transitions.

use serde::{Deserialize, Serialize};

use super::deal::DealRecord;
use super::deposit::{DepositPayload, DepositRecord};
use super::{amount_str, hex_bytes};

/// Client-to-server WebSocket message.
///
/// Externally dispatched on the `"action"` field:
///
/// ```json
/// {"action":"submit_deposit_metadata","payload":{ ... }}
/// {"action":"ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Liveness probe; answered with [`WsServerMessage::Pong`].
    Ping,
    /// Ask for the participation threshold.
    GetThreshold,
    /// Ask for the current quorum.
    GetQuorum,
    /// List fillable deposits at or above `minimum_amount`.
    FetchFillableDeposits {
        #[serde(with = "amount_str")]
        minimum_amount: u128,
    },
    /// Register signed deposit metadata with the operator.
    SubmitDepositMetadata(DepositPayload),
    /// Ask for the operator configuration snapshot.
    FetchConfig,
    /// Force a countdown poll and get the fresh value.
    RefreshCountdown,
}

/// Operator configuration snapshot sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfigInfo {
    /// Ledger-side pooling contract address.
    pub ledger_contract: String,
    /// Compute-network contract address.
    pub compute_contract: String,
    pub threshold: usize,
    #[serde(with = "amount_str")]
    pub minimum_amount: u128,
    pub deal_interval_blocks: u64,
    /// The compute network's encryption key, once bootstrapped.
    pub pub_key_data: Option<PubKeyInfo>,
}

/// The compute network's one-time encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyInfo {
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Opaque task metadata returned alongside the key.
    pub metadata: serde_json::Value,
}

/// A structured registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

/// Server-to-client WebSocket message.
///
/// Serialized like [`WsClientMessage`], dispatched on `"action"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum WsServerMessage {
    Pong,
    /// The number of fillable deposits required to trigger a deal.
    ThresholdInfo { threshold: usize },
    /// The quorum changed (new registration, or reset to 0 on deal creation).
    QuorumChanged { quorum: usize },
    /// Response to [`WsClientMessage::FetchFillableDeposits`].
    FillableDeposits { deposits: Vec<DepositRecord> },
    /// The deposit was registered.
    SubmitDepositSuccess { deposit: DepositRecord },
    /// The deposit was rejected.
    SubmitDepositError { error: ErrorPayload },
    /// Response to [`WsClientMessage::FetchConfig`].
    ConfigInfo { config: OperatorConfigInfo },
    /// The encryption key is available; deposits can be encrypted.
    PubKeyReady { pub_key_data: PubKeyInfo },
    /// A deal was committed on the ledger.
    DealCreated { deal: DealRecord },
    /// A deal finished confidential execution.
    DealExecuted { deal: DealRecord },
    /// The countdown expired below threshold; deposits were verified only.
    QuorumNotReached,
    /// Blocks remaining until the next allowed mix point (clamped at 0).
    CountdownTick { blocks_remaining: u64 },
    /// A server-side failure that does not close the connection.
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close codes used by the operator stream.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;

    /// An unexpected server-side error prevented the connection from
    /// continuing.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The client sent a frame that could not be parsed as a
    /// [`WsClientMessage`].
    pub const BAD_MESSAGE: u16 = 4000;
}

/// Application error codes carried in [`ErrorPayload`].
pub struct ErrorCode;

impl ErrorCode {
    /// The deposit signature does not authenticate the payload.
    pub const INVALID_SIGNATURE: u16 = 4001;

    /// The operator could not persist or process the request.
    pub const INTERNAL: u16 = 4500;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tagging() {
        let json = serde_json::to_value(&WsClientMessage::Ping).unwrap();
        assert_eq!(json["action"], "ping");

        let msg = WsClientMessage::FetchFillableDeposits {
            minimum_amount: 10,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["action"], "fetch_fillable_deposits");
        assert_eq!(json["payload"]["minimum_amount"], "10");
        let back: WsClientMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn server_message_tagging() {
        let msg = WsServerMessage::QuorumChanged { quorum: 3 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["action"], "quorum_changed");
        assert_eq!(json["payload"]["quorum"], 3);

        let json = serde_json::to_value(&WsServerMessage::QuorumNotReached).unwrap();
        assert_eq!(json["action"], "quorum_not_reached");
    }
}
