use crate::health::{self, TeamHealth};
use crate::member::{RoleMapping, TeamMember};
use crate::workspace::WorkspaceStore;
use chrono::{DateTime, Utc};
use muster_bus::EventBus;
use muster_core::{BusEvent, MemberStatus, MusterError, MusterResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Blueprint for forming a team: which roles, which project, who leads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPlan {
    /// The project the team will serve.
    pub project_id: String,
    /// Human-readable project name; doubles as the team name.
    pub project_name: String,
    /// Roles to instantiate, each resolved through a registered mapping.
    pub required_roles: Vec<String>,
    /// The role whose member answers escalations. Must be a required role.
    pub lead_role_id: String,
}

/// Lifecycle state of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    /// Serving its project.
    Active,
    /// Removed; kept only on snapshots taken before dissolution.
    Dissolved,
}

/// A formed team serving one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTeam {
    /// Unique team id.
    pub id: Uuid,
    /// The project it serves. One active team per project.
    pub project_id: String,
    /// Team name, from the project name.
    pub name: String,
    /// Role whose member is the escalation target.
    pub lead_role_id: String,
    /// Members in join order. Order matters: it drives deterministic
    /// tie-breaking when members are ranked for assignment.
    pub members: Vec<TeamMember>,
    /// Workspace provisioned for the team.
    pub workspace_id: String,
    /// Lifecycle state.
    pub status: TeamStatus,
    /// When the team was formed.
    pub created_at: DateTime<Utc>,
}

impl ProjectTeam {
    /// Find a member by agent id.
    pub fn member(&self, agent_id: &str) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.agent_id == agent_id)
    }

    /// Mutable member lookup.
    pub fn member_mut(&mut self, agent_id: &str) -> Option<&mut TeamMember> {
        self.members.iter_mut().find(|m| m.agent_id == agent_id)
    }

    /// The member filling the lead role, if present.
    pub fn lead(&self) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.role_id == self.lead_role_id)
    }
}

#[derive(Default)]
struct TeamState {
    /// role_id -> mapping
    role_mappings: HashMap<String, RoleMapping>,
    teams: HashMap<Uuid, ProjectTeam>,
    /// project_id -> team id, enforcing one active team per project
    project_index: HashMap<String, Uuid>,
}

/// Owns all teams and the role mapping registry.
///
/// Every membership mutation publishes its event on the bus before the
/// mutating method returns, and no event is published while the internal
/// lock is held, so subscribers may call back into the manager.
pub struct TeamManager {
    bus: Arc<EventBus>,
    workspaces: Arc<dyn WorkspaceStore>,
    state: RwLock<TeamState>,
}

impl TeamManager {
    /// Creates a manager publishing on `bus` and provisioning via `workspaces`.
    pub fn new(bus: Arc<EventBus>, workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self {
            bus,
            workspaces,
            state: RwLock::new(TeamState::default()),
        }
    }

    /// Register (or replace) the mapping for a role.
    pub async fn register_role_mapping(&self, mapping: RoleMapping) {
        info!(
            role_id = %mapping.role_id,
            agent_id = %mapping.agent_id,
            "Role mapping registered"
        );
        let mut state = self.state.write().await;
        state.role_mappings.insert(mapping.role_id.clone(), mapping);
    }

    /// Look up a registered role mapping.
    pub async fn role_mapping(&self, role_id: &str) -> Option<RoleMapping> {
        let state = self.state.read().await;
        state.role_mappings.get(role_id).cloned()
    }

    /// Form a team for a project from its plan.
    ///
    /// Fails without side effects if the project already has a team, if the
    /// lead role is not among the required roles, or if any required role
    /// has no registered mapping. Duplicate entries in `required_roles` are
    /// instantiated once.
    pub async fn form_team(&self, plan: &TeamPlan) -> MusterResult<Uuid> {
        let members = {
            let state = self.state.read().await;
            if state.project_index.contains_key(&plan.project_id) {
                return Err(MusterError::Team(format!(
                    "project '{}' already has an active team",
                    plan.project_id
                )));
            }
            if !plan.required_roles.contains(&plan.lead_role_id) {
                return Err(MusterError::Team(format!(
                    "lead role '{}' is not among the required roles",
                    plan.lead_role_id
                )));
            }
            let mut members = Vec::new();
            let mut seen = HashSet::new();
            for role_id in &plan.required_roles {
                if !seen.insert(role_id) {
                    continue;
                }
                let mapping = state.role_mappings.get(role_id).ok_or_else(|| {
                    MusterError::Team(format!("no role mapping for required role '{role_id}'"))
                })?;
                members.push(TeamMember::from_mapping(mapping));
            }
            members
        };

        self.bus.publish(&BusEvent::TeamForming {
            project_id: plan.project_id.clone(),
            project_name: plan.project_name.clone(),
        });

        let workspace = self
            .workspaces
            .provision(&plan.project_id, &plan.project_name)
            .await?;

        let team = ProjectTeam {
            id: Uuid::new_v4(),
            project_id: plan.project_id.clone(),
            name: plan.project_name.clone(),
            lead_role_id: plan.lead_role_id.clone(),
            members,
            workspace_id: workspace.id.clone(),
            status: TeamStatus::Active,
            created_at: Utc::now(),
        };
        let team_id = team.id;
        let member_count = team.members.len();

        {
            let mut state = self.state.write().await;
            // A racing form_team for the same project may have won while the
            // workspace was provisioning.
            if state.project_index.contains_key(&plan.project_id) {
                warn!(project_id = %plan.project_id, "Team formed concurrently; discarding");
                return Err(MusterError::Team(format!(
                    "project '{}' already has an active team",
                    plan.project_id
                )));
            }
            state.project_index.insert(plan.project_id.clone(), team_id);
            state.teams.insert(team_id, team);
        }

        info!(
            team_id = %team_id,
            project_id = %plan.project_id,
            members = member_count,
            workspace_id = %workspace.id,
            "Team formed"
        );
        self.bus.publish(&BusEvent::TeamFormed {
            team_id,
            project_id: plan.project_id.clone(),
            workspace_id: workspace.id,
            member_count,
        });
        Ok(team_id)
    }

    /// Remove a team and its project index entry.
    pub async fn dissolve_team(&self, team_id: Uuid, reason: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            match state.teams.remove(&team_id) {
                Some(team) => {
                    state.project_index.remove(&team.project_id);
                    Some(team)
                }
                None => None,
            }
        };
        let Some(team) = removed else {
            warn!(team_id = %team_id, "Dissolve requested for unknown team");
            return false;
        };
        info!(team_id = %team_id, project_id = %team.project_id, reason, "Team dissolved");
        self.bus.publish(&BusEvent::TeamDissolved {
            team_id,
            project_id: team.project_id,
            reason: reason.to_string(),
        });
        true
    }

    /// Add an agent to an existing team via its role mapping.
    ///
    /// Idempotent: if the agent is already a member, returns the existing
    /// member and publishes nothing. Returns `None` for an unknown team.
    pub async fn add_member(&self, team_id: Uuid, mapping: &RoleMapping) -> Option<TeamMember> {
        let member = {
            let mut state = self.state.write().await;
            let team = state.teams.get_mut(&team_id)?;
            if let Some(existing) = team.member(&mapping.agent_id) {
                return Some(existing.clone());
            }
            let member = TeamMember::from_mapping(mapping);
            team.members.push(member.clone());
            member
        };
        info!(team_id = %team_id, agent_id = %member.agent_id, role_id = %member.role_id, "Member joined");
        self.bus.publish(&BusEvent::TeamMemberJoined {
            team_id,
            agent_id: member.agent_id.clone(),
            role_id: member.role_id.clone(),
        });
        Some(member)
    }

    /// Remove an agent from a team.
    pub async fn remove_member(&self, team_id: Uuid, agent_id: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let Some(team) = state.teams.get_mut(&team_id) else {
                return false;
            };
            let before = team.members.len();
            team.members.retain(|m| m.agent_id != agent_id);
            team.members.len() < before
        };
        if !removed {
            return false;
        }
        info!(team_id = %team_id, agent_id, "Member left");
        self.bus.publish(&BusEvent::TeamMemberLeft {
            team_id,
            agent_id: agent_id.to_string(),
        });
        true
    }

    /// Set a member's live status, publishing the old and new values.
    pub async fn update_member_status(
        &self,
        team_id: Uuid,
        agent_id: &str,
        status: MemberStatus,
    ) -> bool {
        let old_status = {
            let mut state = self.state.write().await;
            let Some(team) = state.teams.get_mut(&team_id) else {
                return false;
            };
            let Some(member) = team.member_mut(agent_id) else {
                return false;
            };
            let old = member.status;
            member.status = status;
            old
        };
        self.bus.publish(&BusEvent::TeamMemberStatusChanged {
            team_id,
            agent_id: agent_id.to_string(),
            old_status,
            new_status: status,
        });
        true
    }

    /// Mark a member busy on a task and record it as their current task.
    pub async fn assign_task(&self, team_id: Uuid, agent_id: &str, task_id: Uuid) -> bool {
        let old_status = {
            let mut state = self.state.write().await;
            let Some(team) = state.teams.get_mut(&team_id) else {
                return false;
            };
            let Some(member) = team.member_mut(agent_id) else {
                return false;
            };
            let old = member.status;
            member.current_task = Some(task_id);
            member.status = MemberStatus::Busy;
            old
        };
        self.bus.publish(&BusEvent::TeamMemberStatusChanged {
            team_id,
            agent_id: agent_id.to_string(),
            old_status,
            new_status: MemberStatus::Busy,
        });
        true
    }

    /// Clear a member's current task and mark them idle.
    pub async fn clear_task(&self, team_id: Uuid, agent_id: &str) -> bool {
        let old_status = {
            let mut state = self.state.write().await;
            let Some(team) = state.teams.get_mut(&team_id) else {
                return false;
            };
            let Some(member) = team.member_mut(agent_id) else {
                return false;
            };
            let old = member.status;
            member.current_task = None;
            member.status = MemberStatus::Idle;
            old
        };
        self.bus.publish(&BusEvent::TeamMemberStatusChanged {
            team_id,
            agent_id: agent_id.to_string(),
            old_status,
            new_status: MemberStatus::Idle,
        });
        true
    }

    /// Record a member check-in. No event; heartbeats are high-frequency.
    pub async fn record_heartbeat(&self, team_id: Uuid, agent_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(team) = state.teams.get_mut(&team_id) else {
            return false;
        };
        let Some(member) = team.member_mut(agent_id) else {
            return false;
        };
        member.last_heartbeat = Utc::now();
        true
    }

    /// Snapshot of one team.
    pub async fn get_team(&self, team_id: Uuid) -> Option<ProjectTeam> {
        let state = self.state.read().await;
        state.teams.get(&team_id).cloned()
    }

    /// Snapshot of the active team for a project.
    pub async fn team_for_project(&self, project_id: &str) -> Option<ProjectTeam> {
        let state = self.state.read().await;
        let team_id = state.project_index.get(project_id)?;
        state.teams.get(team_id).cloned()
    }

    /// The member filling a team's lead role.
    pub async fn get_team_lead(&self, team_id: Uuid) -> Option<TeamMember> {
        let state = self.state.read().await;
        state.teams.get(&team_id)?.lead().cloned()
    }

    /// Snapshots of all teams, oldest first.
    pub async fn list_teams(&self) -> Vec<ProjectTeam> {
        let state = self.state.read().await;
        let mut teams: Vec<ProjectTeam> = state.teams.values().cloned().collect();
        teams.sort_by_key(|t| t.created_at);
        teams
    }

    /// Number of active teams.
    pub async fn team_count(&self) -> usize {
        let state = self.state.read().await;
        state.teams.len()
    }

    /// Every member of every team with its team id, teams oldest first,
    /// members in join order. This is the candidate pool for assignment.
    pub async fn roster(&self) -> Vec<(Uuid, TeamMember)> {
        let state = self.state.read().await;
        let mut teams: Vec<&ProjectTeam> = state.teams.values().collect();
        teams.sort_by_key(|t| t.created_at);
        teams
            .iter()
            .flat_map(|team| team.members.iter().map(|m| (team.id, m.clone())))
            .collect()
    }

    /// First roster entry for an agent, if it is on any team.
    pub async fn find_member(&self, agent_id: &str) -> Option<(Uuid, TeamMember)> {
        self.roster()
            .await
            .into_iter()
            .find(|(_, member)| member.agent_id == agent_id)
    }

    /// Health classification for a team.
    pub async fn team_health(&self, team_id: Uuid) -> Option<TeamHealth> {
        let state = self.state.read().await;
        state.teams.get(&team_id).map(|t| health::classify(&t.members))
    }

    /// Remediation hints for a degraded or critical team. Empty for healthy
    /// or unknown teams.
    pub async fn recovery_suggestions(&self, team_id: Uuid) -> Vec<String> {
        let state = self.state.read().await;
        state
            .teams
            .get(&team_id)
            .map(health::recovery_suggestions)
            .unwrap_or_default()
    }
}
