//! Team formation, membership, and health for the Muster engine.
//!
//! A team is formed from static role mappings for one project, gets a
//! workspace from the external workspace provider, and carries its members'
//! live status. Every membership mutation is announced on the bus before the
//! mutating call returns.
//!
//! # Main types
//!
//! - [`TeamManager`] — Owns all teams and the role mapping registry.
//! - [`ProjectTeam`] / [`TeamMember`] — A team and its members, in join order.
//! - [`RoleMapping`] — Static config resolving a role to a concrete agent.
//! - [`TeamHealth`] — healthy / degraded / critical classification.
//! - [`WorkspaceStore`] — Interface to the external workspace provider.

/// Team health classification and recovery hints.
pub mod health;
/// Role mappings and team members.
pub mod member;
/// The team manager.
pub mod manager;
/// The external workspace/versioning store interface.
pub mod workspace;

pub use health::TeamHealth;
pub use manager::{ProjectTeam, TeamManager, TeamPlan, TeamStatus};
pub use member::{RoleMapping, TeamMember};
pub use workspace::{InMemoryWorkspaceStore, WorkspaceInfo, WorkspaceStore};
