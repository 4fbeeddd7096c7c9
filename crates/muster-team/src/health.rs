use crate::manager::ProjectTeam;
use crate::member::TeamMember;
use serde::{Deserialize, Serialize};

/// Reachability classification of a whole team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamHealth {
    /// Every member is reachable.
    Healthy,
    /// Some, but not all, members are offline or errored.
    Degraded,
    /// No member is reachable. An empty team is also critical.
    Critical,
}

impl std::fmt::Display for TeamHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamHealth::Healthy => write!(f, "healthy"),
            TeamHealth::Degraded => write!(f, "degraded"),
            TeamHealth::Critical => write!(f, "critical"),
        }
    }
}

/// Classify a member list by how many members are unreachable.
pub fn classify(members: &[TeamMember]) -> TeamHealth {
    if members.is_empty() {
        return TeamHealth::Critical;
    }
    let down = members
        .iter()
        .filter(|m| m.status.is_unreachable())
        .count();
    if down == 0 {
        TeamHealth::Healthy
    } else if down == members.len() {
        TeamHealth::Critical
    } else {
        TeamHealth::Degraded
    }
}

/// Human-readable remediation hints for a degraded or critical team.
///
/// Healthy teams get an empty list. Hints follow member join order, so the
/// output is deterministic for a given team state.
pub fn recovery_suggestions(team: &ProjectTeam) -> Vec<String> {
    match classify(&team.members) {
        TeamHealth::Healthy => Vec::new(),
        TeamHealth::Degraded => {
            let mut hints: Vec<String> = team
                .members
                .iter()
                .filter(|m| m.status.is_unreachable())
                .map(|m| {
                    format!(
                        "reassign tasks from {} member '{}' and bring a replacement online",
                        m.status, m.agent_id
                    )
                })
                .collect();
            if team.lead().is_some_and(|lead| lead.status.is_unreachable()) {
                hints.push(format!(
                    "team lead for '{}' is unreachable; escalations will go unanswered until the lead recovers",
                    team.name
                ));
            }
            hints
        }
        TeamHealth::Critical => {
            if team.members.is_empty() {
                vec![format!(
                    "team '{}' has no members; add members or dissolve it",
                    team.name
                )]
            } else {
                vec![format!(
                    "no reachable members remain on team '{}'; dissolve it and re-form once agents recover",
                    team.name
                )]
            }
        }
    }
}
