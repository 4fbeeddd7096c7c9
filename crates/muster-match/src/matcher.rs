use crate::extract::{CapabilityExtractor, KeywordExtractor};
use crate::taxonomy::{Capability, CapabilityRegistry};
use chrono::{DateTime, Utc};
use muster_core::{EstimatedEffort, MemberStatus, TaskPriority};
use serde::{Deserialize, Serialize};

/// Component weights for the final score.
const CAPABILITY_WEIGHT: f64 = 0.6;
const AVAILABILITY_WEIGHT: f64 = 0.2;
const PRIORITY_WEIGHT: f64 = 0.2;

/// Urgency boost applied to the priority component when a deadline is near.
fn urgency_boost(deadline: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let remaining = deadline - now;
    if remaining < chrono::Duration::days(1) {
        1.3
    } else if remaining < chrono::Duration::days(3) {
        1.1
    } else {
        1.0
    }
}

/// What a task needs from an agent, as the matcher sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequirement {
    /// External identifier of the task being matched.
    pub task_id: String,
    /// Free-form description; used for capability extraction when
    /// `required_capabilities` is empty.
    pub description: String,
    /// Capability names the task needs.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Priority class.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Hard deadline, if any.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Effort estimate.
    #[serde(default)]
    pub estimated_effort: EstimatedEffort,
}

impl TaskRequirement {
    /// Creates a requirement with defaults (medium priority, medium effort).
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            required_capabilities: Vec::new(),
            priority: TaskPriority::default(),
            deadline: None,
            estimated_effort: EstimatedEffort::default(),
        }
    }

    /// Set explicit required capabilities.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Set the priority class.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set a deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the effort estimate.
    pub fn with_effort(mut self, effort: EstimatedEffort) -> Self {
        self.estimated_effort = effort;
        self
    }
}

/// The matcher's view of one agent: identity, live status, held capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// The agent.
    pub agent_id: String,
    /// Role the agent fills on its team.
    pub role_id: String,
    /// Live status at scoring time.
    pub status: MemberStatus,
    /// Capability names the agent holds.
    pub capabilities: Vec<String>,
}

impl AgentProfile {
    /// Creates a profile.
    pub fn new(
        agent_id: impl Into<String>,
        role_id: impl Into<String>,
        status: MemberStatus,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            role_id: role_id.into(),
            status,
            capabilities,
        }
    }
}

/// One agent's fitness for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// The scored agent.
    pub agent_id: String,
    /// The agent's role.
    pub role_id: String,
    /// Fitness in `[0, 100]`, higher is better.
    pub score: u32,
    /// Required capabilities the agent holds (directly or via a related
    /// capability), in requirement order.
    pub matched_capabilities: Vec<String>,
    /// Required capabilities the agent lacks.
    pub missing_capabilities: Vec<String>,
    /// Short human-readable scoring summary.
    pub reason: String,
}

/// Scores agents against task requirements.
///
/// The final score is a weighted sum of three components, each in `[0, 100]`:
/// ```text
/// score = 0.6 × capability + 0.2 × availability + 0.2 × priority
/// ```
/// - capability: complexity-weighted share of required capabilities the
///   agent holds; 100 when the task requires nothing specific.
/// - availability: idle = 100, busy = 50, offline/error = 0.
/// - priority: starts at 100, −30 if the agent is busy, scaled by the task's
///   priority multiplier (critical 1.2, high 1.1, medium 1.0, low 0.9) and
///   by an urgency boost when a deadline is near (< 1 day ×1.3, < 3 days
///   ×1.1), clamped back to 100.
///
/// Hard-fail rule: a task with explicit requirements scores 0 against an
/// agent holding none of them, regardless of availability or urgency. An
/// agent with zero relevant skill is never selected just because it's idle.
pub struct CapabilityMatcher {
    registry: CapabilityRegistry,
    extractor: Box<dyn CapabilityExtractor>,
}

impl CapabilityMatcher {
    /// Creates a matcher with an empty taxonomy and the keyword extractor.
    pub fn new() -> Self {
        Self {
            registry: CapabilityRegistry::new(),
            extractor: Box::new(KeywordExtractor),
        }
    }

    /// Replace the extraction strategy.
    pub fn with_extractor(mut self, extractor: Box<dyn CapabilityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Register a capability in the taxonomy.
    pub fn register_capability(&mut self, capability: Capability) {
        self.registry.register(capability);
    }

    /// The underlying taxonomy.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Derive capability names from a task description.
    pub fn parse_task_capabilities(&self, description: &str) -> Vec<String> {
        self.extractor.extract(description, &self.registry)
    }

    /// Score one agent against one task.
    pub fn score(&self, task: &TaskRequirement, agent: &AgentProfile) -> MatchResult {
        let (capability, matched, missing) = self.capability_component(task, agent);

        // Hard-fail: explicit requirements, none held.
        if !task.required_capabilities.is_empty() && capability == 0.0 {
            return MatchResult {
                agent_id: agent.agent_id.clone(),
                role_id: agent.role_id.clone(),
                score: 0,
                matched_capabilities: matched,
                missing_capabilities: missing,
                reason: format!(
                    "0/{} required capabilities matched",
                    task.required_capabilities.len()
                ),
            };
        }

        let availability = availability_component(agent.status);
        let priority = priority_component(task, agent);
        let total = CAPABILITY_WEIGHT * capability
            + AVAILABILITY_WEIGHT * availability
            + PRIORITY_WEIGHT * priority;

        let reason = if task.required_capabilities.is_empty() {
            "no specific capability requirements".to_string()
        } else {
            format!(
                "{}/{} required capabilities matched",
                matched.len(),
                task.required_capabilities.len()
            )
        };

        MatchResult {
            agent_id: agent.agent_id.clone(),
            role_id: agent.role_id.clone(),
            score: total.round() as u32,
            matched_capabilities: matched,
            missing_capabilities: missing,
            reason,
        }
    }

    /// Rank a pool of agents for a task, best first.
    ///
    /// Unreachable agents are excluded up front, and only agents matching at
    /// least one required capability survive. The sort is stable, so equal
    /// scores keep their input (roster) order.
    pub fn rank(&self, task: &TaskRequirement, agents: &[AgentProfile]) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = agents
            .iter()
            .filter(|agent| !agent.status.is_unreachable())
            .map(|agent| self.score(task, agent))
            .filter(|result| !result.matched_capabilities.is_empty())
            .collect();
        results.sort_by(|a, b| b.score.cmp(&a.score));
        results
    }

    /// Weighted capability share plus the matched/missing breakdown.
    fn capability_component(
        &self,
        task: &TaskRequirement,
        agent: &AgentProfile,
    ) -> (f64, Vec<String>, Vec<String>) {
        if task.required_capabilities.is_empty() {
            return (100.0, Vec::new(), Vec::new());
        }

        let mut matched = Vec::new();
        let mut missing = Vec::new();
        let mut matched_weight = 0u32;
        let mut total_weight = 0u32;
        for name in &task.required_capabilities {
            let weight = self.registry.weight_of(name);
            total_weight += weight;
            if self.agent_holds(agent, name) {
                matched_weight += weight;
                matched.push(name.clone());
            } else {
                missing.push(name.clone());
            }
        }

        let share = f64::from(matched_weight) / f64::from(total_weight) * 100.0;
        (share, matched, missing)
    }

    /// Direct hold, or hold via one of the capability's declared relations.
    fn agent_holds(&self, agent: &AgentProfile, name: &str) -> bool {
        if agent.capabilities.iter().any(|held| held == name) {
            return true;
        }
        self.registry.get(name).is_some_and(|capability| {
            capability
                .related_capabilities
                .iter()
                .any(|related| agent.capabilities.contains(related))
        })
    }
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn availability_component(status: MemberStatus) -> f64 {
    match status {
        MemberStatus::Idle => 100.0,
        MemberStatus::Busy => 50.0,
        MemberStatus::Offline | MemberStatus::Error => 0.0,
    }
}

fn priority_component(task: &TaskRequirement, agent: &AgentProfile) -> f64 {
    let mut score = 100.0;
    if agent.status == MemberStatus::Busy {
        score -= 30.0;
    }
    score *= match task.priority {
        TaskPriority::Critical => 1.2,
        TaskPriority::High => 1.1,
        TaskPriority::Medium => 1.0,
        TaskPriority::Low => 0.9,
    };
    if let Some(deadline) = task.deadline {
        score *= urgency_boost(deadline, Utc::now());
    }
    score.min(100.0)
}
