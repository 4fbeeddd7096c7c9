//! Agent-to-agent collaboration over the event bus.
//!
//! Agents ask each other for help, request reviews, and escalate problems
//! to their team lead. Every ask is a [`CollaborationRequest`] delivered as
//! a bus event; the requester awaits a [`CollaborationReply`] and receives
//! the canonical timeout reply if none arrives in time. A background
//! sweeper expires requests nobody answered.
//!
//! # Main types
//!
//! - [`CollaborationProtocol`]: opens, answers, and expires requests
//! - [`CollabConfig`]: default timeout and sweep cadence
//! - [`RequestSubscription`]: an agent's registration for incoming asks
//!
//! [`CollaborationRequest`]: muster_core::CollaborationRequest
//! [`CollaborationReply`]: muster_core::CollaborationReply

/// Request lifecycle and delivery.
pub mod protocol;

pub use protocol::{CollabConfig, CollaborationProtocol, RequestSubscription};
