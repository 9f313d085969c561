//! The deposit entity.

use mixpool_sdk::objects::deposit::{DepositPayload, DepositRecord, DepositStatus};
use mixpool_sdk::objects::Address;
use serde::{Deserialize, Serialize};

/// A participant's registered intent to join a mix.
///
/// Immutable once signature-verified, except for the status transitions
/// `Pending -> Fillable -> Consumed`. Uniquely identified by
/// `(sender, amount)`; see [`Deposit::storage_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub sender: Address,
    pub amount: u128,
    pub enc_recipient: Vec<u8>,
    pub pub_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub status: DepositStatus,
    /// Unix timestamp of registration.
    pub registered_at: i64,
}

impl Deposit {
    /// Build a `Pending` deposit from a verified submission.
    pub fn from_payload(payload: DepositPayload, registered_at: i64) -> Self {
        Self {
            sender: payload.sender,
            amount: payload.amount,
            enc_recipient: payload.enc_recipient,
            pub_key: payload.pub_key,
            signature: payload.signature,
            status: DepositStatus::Pending,
            registered_at,
        }
    }

    /// Storage key: `"{sender}:{amount}"`.
    pub fn storage_key(&self) -> String {
        Self::key_for(&self.sender, self.amount)
    }

    pub fn key_for(sender: &Address, amount: u128) -> String {
        format!("{sender}:{amount}")
    }

    /// Make the deposit available for deal composition.
    pub fn make_fillable(&mut self) {
        if self.status == DepositStatus::Pending {
            self.status = DepositStatus::Fillable;
        }
    }

    /// Mark the deposit as included in a created deal. Idempotent.
    pub fn consume(&mut self) {
        self.status = DepositStatus::Consumed;
    }

    pub fn is_fillable(&self) -> bool {
        self.status == DepositStatus::Fillable
    }
}

impl From<&Deposit> for DepositRecord {
    fn from(deposit: &Deposit) -> Self {
        Self {
            sender: deposit.sender,
            amount: deposit.amount,
            enc_recipient: deposit.enc_recipient.clone(),
            pub_key: deposit.pub_key.clone(),
            status: deposit.status,
            registered_at: deposit.registered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(amount: u128) -> Deposit {
        Deposit {
            sender: Address([0x01; 20]),
            amount,
            enc_recipient: vec![0xaa],
            pub_key: vec![0x02],
            signature: vec![0u8; 65],
            status: DepositStatus::Pending,
            registered_at: 0,
        }
    }

    #[test]
    fn status_transitions() {
        let mut d = deposit(10);
        assert!(!d.is_fillable());
        d.make_fillable();
        assert!(d.is_fillable());
        d.consume();
        assert_eq!(d.status, DepositStatus::Consumed);
        // Consuming again is a no-op.
        d.consume();
        assert_eq!(d.status, DepositStatus::Consumed);
        // A consumed deposit never becomes fillable again.
        d.make_fillable();
        assert_eq!(d.status, DepositStatus::Consumed);
    }

    #[test]
    fn storage_key_is_sender_and_amount() {
        let d = deposit(42);
        assert_eq!(d.storage_key(), format!("{}:42", d.sender));
    }
}
