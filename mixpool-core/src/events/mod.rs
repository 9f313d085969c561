//! Event system for the orchestration engine.
//!
//! State transitions are announced through an in-process typed
//! publish/subscribe hub. Delivery is synchronous within the emitting call
//! and follows subscription order per topic; handlers are expected to hand
//! work off (e.g. into a broadcast channel feeding WebSocket sessions)
//! rather than block the emitter.

pub mod hub;
pub mod types;

pub use hub::EventHub;
pub use types::{OperatorEvent, Topic};
