//! Event and topic definitions.

use crate::entities::{Deal, PubKeyData};

/// The topics the operator broadcasts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PubKeyReady,
    DealCreated,
    DealExecuted,
    QuorumChanged,
    QuorumNotReached,
    CountdownTick,
    ThresholdInfo,
}

impl Topic {
    /// Every topic, in broadcast-registration order.
    pub const ALL: [Topic; 7] = [
        Topic::PubKeyReady,
        Topic::DealCreated,
        Topic::DealExecuted,
        Topic::QuorumChanged,
        Topic::QuorumNotReached,
        Topic::CountdownTick,
        Topic::ThresholdInfo,
    ];
}

/// A state transition announced by the orchestration engine.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorEvent {
    /// The encryption key was bootstrapped and cached.
    PubKeyReady { pub_key_data: PubKeyData },
    /// A deal was committed on the ledger.
    DealCreated { deal: Deal },
    /// A deal finished confidential execution.
    DealExecuted { deal: Deal },
    /// The fillable-deposit count changed.
    QuorumChanged { quorum: usize },
    /// The countdown expired below threshold; deposits were verified only.
    QuorumNotReached,
    /// Blocks remaining until the next allowed mix point (clamped at 0).
    CountdownTick { blocks_remaining: u64 },
    /// The participation threshold (announced to new subscribers).
    ThresholdInfo { threshold: usize },
}

impl OperatorEvent {
    pub fn topic(&self) -> Topic {
        match self {
            OperatorEvent::PubKeyReady { .. } => Topic::PubKeyReady,
            OperatorEvent::DealCreated { .. } => Topic::DealCreated,
            OperatorEvent::DealExecuted { .. } => Topic::DealExecuted,
            OperatorEvent::QuorumChanged { .. } => Topic::QuorumChanged,
            OperatorEvent::QuorumNotReached => Topic::QuorumNotReached,
            OperatorEvent::CountdownTick { .. } => Topic::CountdownTick,
            OperatorEvent::ThresholdInfo { .. } => Topic::ThresholdInfo,
        }
    }
}
