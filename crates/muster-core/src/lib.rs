//! Core types and error definitions for the Muster coordination engine.
//!
//! This crate provides the foundational types shared across all Muster crates:
//! error handling, the closed event union carried by the bus, and the
//! collaboration primitives exchanged between agents.
//!
//! # Main types
//!
//! - [`MusterError`] — Unified error enum for all Muster subsystems.
//! - [`MusterResult`] — Convenience alias for `Result<T, MusterError>`.
//! - [`BusEvent`] — Closed union of every event the engine can publish.
//! - [`EventKind`] — Fieldless discriminant of [`BusEvent`], used for subscription.
//! - [`TaskPriority`] — Priority class attached to submitted tasks.
//! - [`CollaborationRequest`] — An agent-to-agent help, review, or escalation ask.

/// The closed event union published on the bus.
pub mod event;
/// Shared domain types: priorities, member status, collaboration primitives.
pub mod types;

pub use event::{BusEvent, EventKind};
pub use types::{
    CollaborationReply, CollaborationRequest, EstimatedEffort, Finding, FindingScope,
    FindingSeverity, MemberStatus, RequestKind, RequestStatus, TaskPriority,
};

// --- Error types ---

/// Top-level error type for the Muster engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum MusterError {
    /// An error originating from the event bus.
    #[error("Bus error: {0}")]
    Bus(String),

    /// An error in capability registration or match scoring.
    #[error("Match error: {0}")]
    Match(String),

    /// An error in team formation or membership management.
    #[error("Team error: {0}")]
    Team(String),

    /// An error from the task router.
    #[error("Router error: {0}")]
    Router(String),

    /// An error in the agent collaboration protocol.
    #[error("Collaboration error: {0}")]
    Collab(String),

    /// An error from a workspace store backend.
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MusterError`].
pub type MusterResult<T> = Result<T, MusterError>;
