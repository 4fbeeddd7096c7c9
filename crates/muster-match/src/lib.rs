//! Task-to-agent fitness scoring for the Muster engine.
//!
//! Given a task's capability requirements and a pool of agent profiles, this
//! crate produces a 0–100 fitness score per agent and a ranked candidate
//! list. Scoring is pure: no clocks are mutated, no events published, so the
//! same inputs always rank the same way.
//!
//! # Main types
//!
//! - [`CapabilityMatcher`] — The scorer; owns the taxonomy and the extractor.
//! - [`CapabilityRegistry`] — Named capabilities with keywords and weights.
//! - [`Capability`] — One entry in the taxonomy.
//! - [`CapabilityExtractor`] — Strategy for deriving requirements from text.
//! - [`TaskRequirement`] / [`AgentProfile`] / [`MatchResult`] — Scoring I/O.

/// Derives required capabilities from free-form task descriptions.
pub mod extract;
/// The match scorer and its input/output types.
pub mod matcher;
/// The capability taxonomy: names, keywords, complexity weights.
pub mod taxonomy;

pub use extract::{CapabilityExtractor, KeywordExtractor};
pub use matcher::{AgentProfile, CapabilityMatcher, MatchResult, TaskRequirement};
pub use taxonomy::{Capability, CapabilityComplexity, CapabilityRegistry};
