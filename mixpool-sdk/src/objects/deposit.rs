//! Deposit wire objects.

use super::{Address, amount_str, hex_bytes};
use serde::{Deserialize, Serialize};

/// Status of a registered deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Accepted but not yet available for deal composition.
    Pending,
    /// Available to be batched into the next deal.
    Fillable,
    /// Included in a created deal; excluded from future quorums.
    Consumed,
}

/// A signed deposit-metadata submission.
///
/// The `signature` must authenticate `(sender, amount, enc_recipient,
/// pub_key)` against `sender`; see [`crate::signature`] for the exact
/// message encoding and digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPayload {
    pub sender: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    /// Recipient address encrypted to the compute network's key.
    #[serde(with = "hex_bytes")]
    pub enc_recipient: Vec<u8>,
    /// The participant's ephemeral public key for result encryption.
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
    /// 65-byte recoverable signature (r || s || v).
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// Wire view of a registered deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub sender: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    #[serde(with = "hex_bytes")]
    pub enc_recipient: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub pub_key: Vec<u8>,
    pub status: DepositStatus,
    /// Unix timestamp of registration.
    pub registered_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_json_shape() {
        let payload = DepositPayload {
            sender: Address([0x01; 20]),
            amount: 10,
            enc_recipient: vec![0xaa, 0xbb],
            pub_key: vec![0x02],
            signature: vec![0u8; 65],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["amount"], "10");
        assert_eq!(json["enc_recipient"], "0xaabb");
        let back: DepositPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}
