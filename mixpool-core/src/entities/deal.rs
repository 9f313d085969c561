//! The deal entity.

use super::deposit::Deposit;
use crate::clients::{ExecutionReceipt, LedgerReceipt};
use mixpool_sdk::objects::deal::{DealRecord, DealStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A batch of deposits committed together for confidential mixing.
///
/// Holds a snapshot of its constituent deposits in registration order.
/// Never mutated once terminal (`Executed` or `Failed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    /// The common deposit amount of all participants.
    pub amount: u128,
    /// Constituent deposits in registration order. Non-empty; its size is
    /// at least the configured threshold at creation time.
    pub deposits: Vec<Deposit>,
    pub status: DealStatus,
    pub ledger_receipt: Option<LedgerReceipt>,
    pub execution_receipt: Option<ExecutionReceipt>,
    /// Unix timestamp of deal creation.
    pub created_at: i64,
}

impl Deal {
    /// A deal committed on the ledger, awaiting execution.
    pub fn created(
        id: Uuid,
        amount: u128,
        deposits: Vec<Deposit>,
        ledger_receipt: LedgerReceipt,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            amount,
            deposits,
            status: DealStatus::Created,
            ledger_receipt: Some(ledger_receipt),
            execution_receipt: None,
            created_at,
        }
    }

    /// An audit record for a deal whose ledger transaction failed.
    pub fn failed(id: Uuid, amount: u128, deposits: Vec<Deposit>, created_at: i64) -> Self {
        Self {
            id,
            amount,
            deposits,
            status: DealStatus::Failed,
            ledger_receipt: None,
            execution_receipt: None,
            created_at,
        }
    }

    /// Record the execution receipt and move to `Executed`.
    pub fn mark_executed(&mut self, receipt: ExecutionReceipt) {
        self.status = DealStatus::Executed;
        self.execution_receipt = Some(receipt);
    }

    pub fn storage_key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Deal> for DealRecord {
    fn from(deal: &Deal) -> Self {
        Self {
            id: deal.id,
            amount: deal.amount,
            participants: deal.deposits.iter().map(|d| d.sender).collect(),
            status: deal.status,
            created_at: deal.created_at,
        }
    }
}
