//! Shared types and protocol definitions for the Mixpool operator.
//!
//! This crate carries everything a client and the operator must agree on:
//! the wire objects ([`objects`]), the deposit-metadata signature scheme
//! ([`signature`]), and, behind the `client` feature, a WebSocket client
//! for the operator protocol ([`client`]).

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
