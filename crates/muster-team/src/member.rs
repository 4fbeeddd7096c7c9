use chrono::{DateTime, Utc};
use muster_core::MemberStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Static config resolving a logical role to a concrete agent identity.
///
/// Registered once at startup (usually from the config file) and consulted
/// whenever a team is formed or a member added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Logical role, e.g. `"backend-engineer"`.
    pub role_id: String,
    /// Human-readable role name.
    pub role_name: String,
    /// The agent that fills this role.
    pub agent_id: String,
    /// Capabilities the agent brings to the role.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Decision gates where this role can veto.
    #[serde(default)]
    pub veto_gates: Vec<String>,
    /// Decision gates where this role's approval is required.
    #[serde(default)]
    pub approval_gates: Vec<String>,
}

/// One agent on one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    /// The agent.
    pub agent_id: String,
    /// Role the agent fills.
    pub role_id: String,
    /// Display name, taken from the role mapping.
    pub name: String,
    /// Live status.
    pub status: MemberStatus,
    /// Capabilities the agent holds.
    pub capabilities: Vec<String>,
    /// Queue id of the task the agent is working, if busy.
    pub current_task: Option<Uuid>,
    /// When the agent joined the team.
    pub joined_at: DateTime<Utc>,
    /// Last time the agent checked in.
    pub last_heartbeat: DateTime<Utc>,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TeamMember {
    /// Instantiate a member from its role mapping, idle and just joined.
    pub fn from_mapping(mapping: &RoleMapping) -> Self {
        let now = Utc::now();
        Self {
            agent_id: mapping.agent_id.clone(),
            role_id: mapping.role_id.clone(),
            name: mapping.role_name.clone(),
            status: MemberStatus::Idle,
            capabilities: mapping.capabilities.clone(),
            current_task: None,
            joined_at: now,
            last_heartbeat: now,
            metadata: HashMap::new(),
        }
    }
}
