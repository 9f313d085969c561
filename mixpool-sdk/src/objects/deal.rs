//! Deal wire objects.

use super::{Address, amount_str};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Committed on the ledger, awaiting confidential execution.
    Created,
    /// The compute network returned an execution receipt.
    Executed,
    /// The ledger transaction never succeeded.
    Failed,
}

/// Wire view of a deal.
///
/// Receipts stay operator-side; clients only see the participant set and
/// the lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: Uuid,
    #[serde(with = "amount_str")]
    pub amount: u128,
    /// Participant senders in registration order.
    pub participants: Vec<Address>,
    pub status: DealStatus,
    /// Unix timestamp of deal creation.
    pub created_at: i64,
}
