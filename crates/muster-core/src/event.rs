use crate::types::{CollaborationRequest, Finding, FindingScope, MemberStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every event the engine can publish, as one closed union.
///
/// Subscribers register against an [`EventKind`] and receive the matching
/// variants with their payloads already typed — there is no string/any layer
/// to re-validate on the consumer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BusEvent {
    /// A task entered the queue.
    #[serde(rename = "task:submitted")]
    TaskSubmitted {
        /// Queue id of the new task.
        task_id: Uuid,
        /// Computed queue priority in `[1, 100]`.
        priority: u32,
        /// Submission time.
        timestamp: DateTime<Utc>,
    },

    /// A queued task was handed to an agent.
    #[serde(rename = "task:assigned")]
    TaskAssigned {
        /// The task.
        task_id: Uuid,
        /// The agent now responsible for it.
        agent_id: String,
    },

    /// An assigned agent reported it began working.
    #[serde(rename = "task:started")]
    TaskStarted {
        /// The task.
        task_id: Uuid,
        /// The agent working it.
        agent_id: String,
    },

    /// A task finished successfully.
    #[serde(rename = "task:completed")]
    TaskCompleted {
        /// The task.
        task_id: Uuid,
        /// The agent that finished it.
        agent_id: String,
        /// Worker-reported result payload.
        result: serde_json::Value,
        /// Project the task belonged to, if any.
        project_id: Option<String>,
    },

    /// A task failed with no retries left.
    #[serde(rename = "task:failed")]
    TaskFailed {
        /// The task.
        task_id: Uuid,
        /// The agent that last held it.
        agent_id: String,
        /// Worker-reported error.
        error: String,
    },

    /// A failed task was re-queued and a delayed re-assignment scheduled.
    #[serde(rename = "task:retry_scheduled")]
    TaskRetryScheduled {
        /// The task.
        task_id: Uuid,
        /// Retry attempt number, starting at 1.
        retry_count: u32,
        /// Attempts allowed before the failure is terminal.
        max_retries: u32,
        /// Backoff delay before the re-assignment attempt.
        delay_ms: u64,
    },

    /// A supervisor changed a task's queue priority.
    #[serde(rename = "task:priority_changed")]
    TaskPriorityChanged {
        /// The task.
        task_id: Uuid,
        /// Priority before the change.
        old_priority: u32,
        /// Priority after the change.
        new_priority: u32,
    },

    /// The router finished recovering from an agent failure.
    #[serde(rename = "task:agent_failure_handled")]
    AgentFailureHandled {
        /// The agent that failed.
        agent_id: String,
        /// How many of its tasks found a new agent.
        tasks_reassigned: usize,
    },

    /// Team formation started for a project.
    #[serde(rename = "team:forming")]
    TeamForming {
        /// The project.
        project_id: String,
        /// Human-readable project name.
        project_name: String,
    },

    /// A team finished forming and has a workspace.
    #[serde(rename = "team:formed")]
    TeamFormed {
        /// The new team.
        team_id: Uuid,
        /// The project it serves.
        project_id: String,
        /// Workspace provisioned for the team.
        workspace_id: String,
        /// Number of members instantiated from role mappings.
        member_count: usize,
    },

    /// An agent joined an existing team.
    #[serde(rename = "team:member:joined")]
    TeamMemberJoined {
        /// The team.
        team_id: Uuid,
        /// The joining agent.
        agent_id: String,
        /// Role the agent fills.
        role_id: String,
    },

    /// An agent left a team.
    #[serde(rename = "team:member:left")]
    TeamMemberLeft {
        /// The team.
        team_id: Uuid,
        /// The departing agent.
        agent_id: String,
    },

    /// A team member's live status changed.
    #[serde(rename = "team:member:status_changed")]
    TeamMemberStatusChanged {
        /// The team.
        team_id: Uuid,
        /// The member.
        agent_id: String,
        /// Status before the change.
        old_status: MemberStatus,
        /// Status after the change.
        new_status: MemberStatus,
    },

    /// A team was dissolved and removed.
    #[serde(rename = "team:dissolved")]
    TeamDissolved {
        /// The team.
        team_id: Uuid,
        /// The project it served.
        project_id: String,
        /// Why it was dissolved.
        reason: String,
    },

    /// An agent asked another agent for help.
    #[serde(rename = "collaboration:help:requested")]
    HelpRequested {
        /// The full request, addressed via `request.to_agent_id`.
        request: CollaborationRequest,
    },

    /// An agent asked another agent for a review.
    #[serde(rename = "collaboration:review:requested")]
    ReviewRequested {
        /// The full request, addressed via `request.to_agent_id`.
        request: CollaborationRequest,
    },

    /// A problem was escalated to a team lead.
    #[serde(rename = "collaboration:escalation")]
    EscalationRaised {
        /// The full request, addressed to the resolved lead.
        request: CollaborationRequest,
    },

    /// A pending collaboration request received its answer.
    #[serde(rename = "collaboration:response")]
    CollaborationResponse {
        /// The request that was answered.
        request_id: Uuid,
        /// Whether the target agreed.
        accepted: bool,
    },

    /// An accepted collaboration request was finished.
    #[serde(rename = "collaboration:completed")]
    CollaborationCompleted {
        /// The request that was finished.
        request_id: Uuid,
        /// Result attached by the responder.
        result: serde_json::Value,
    },

    /// A pending collaboration request timed out unanswered.
    #[serde(rename = "collaboration:expired")]
    CollaborationExpired {
        /// The request that expired.
        request_id: Uuid,
    },

    /// A fire-and-forget message to everyone listening.
    #[serde(rename = "collaboration:broadcast")]
    CollaborationBroadcast {
        /// Who sent it.
        from_agent_id: String,
        /// The message.
        message: String,
        /// Optional structured context.
        context: Option<serde_json::Value>,
    },

    /// An agent shared a finding (bug, blocker, security concern).
    #[serde(rename = "collaboration:finding:shared")]
    FindingShared {
        /// Who found it.
        from_agent_id: String,
        /// The finding itself.
        finding: Finding,
        /// Who it is addressed to.
        scope: FindingScope,
    },
}

impl BusEvent {
    /// The fieldless discriminant of this event, used for subscription lookup.
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::TaskSubmitted { .. } => EventKind::TaskSubmitted,
            BusEvent::TaskAssigned { .. } => EventKind::TaskAssigned,
            BusEvent::TaskStarted { .. } => EventKind::TaskStarted,
            BusEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            BusEvent::TaskFailed { .. } => EventKind::TaskFailed,
            BusEvent::TaskRetryScheduled { .. } => EventKind::TaskRetryScheduled,
            BusEvent::TaskPriorityChanged { .. } => EventKind::TaskPriorityChanged,
            BusEvent::AgentFailureHandled { .. } => EventKind::AgentFailureHandled,
            BusEvent::TeamForming { .. } => EventKind::TeamForming,
            BusEvent::TeamFormed { .. } => EventKind::TeamFormed,
            BusEvent::TeamMemberJoined { .. } => EventKind::TeamMemberJoined,
            BusEvent::TeamMemberLeft { .. } => EventKind::TeamMemberLeft,
            BusEvent::TeamMemberStatusChanged { .. } => EventKind::TeamMemberStatusChanged,
            BusEvent::TeamDissolved { .. } => EventKind::TeamDissolved,
            BusEvent::HelpRequested { .. } => EventKind::HelpRequested,
            BusEvent::ReviewRequested { .. } => EventKind::ReviewRequested,
            BusEvent::EscalationRaised { .. } => EventKind::EscalationRaised,
            BusEvent::CollaborationResponse { .. } => EventKind::CollaborationResponse,
            BusEvent::CollaborationCompleted { .. } => EventKind::CollaborationCompleted,
            BusEvent::CollaborationExpired { .. } => EventKind::CollaborationExpired,
            BusEvent::CollaborationBroadcast { .. } => EventKind::CollaborationBroadcast,
            BusEvent::FindingShared { .. } => EventKind::FindingShared,
        }
    }
}

/// Fieldless discriminant of [`BusEvent`].
///
/// Subscriptions are keyed by kind; the string form doubles as the public
/// event name in logs and serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `task:submitted`
    TaskSubmitted,
    /// `task:assigned`
    TaskAssigned,
    /// `task:started`
    TaskStarted,
    /// `task:completed`
    TaskCompleted,
    /// `task:failed`
    TaskFailed,
    /// `task:retry_scheduled`
    TaskRetryScheduled,
    /// `task:priority_changed`
    TaskPriorityChanged,
    /// `task:agent_failure_handled`
    AgentFailureHandled,
    /// `team:forming`
    TeamForming,
    /// `team:formed`
    TeamFormed,
    /// `team:member:joined`
    TeamMemberJoined,
    /// `team:member:left`
    TeamMemberLeft,
    /// `team:member:status_changed`
    TeamMemberStatusChanged,
    /// `team:dissolved`
    TeamDissolved,
    /// `collaboration:help:requested`
    HelpRequested,
    /// `collaboration:review:requested`
    ReviewRequested,
    /// `collaboration:escalation`
    EscalationRaised,
    /// `collaboration:response`
    CollaborationResponse,
    /// `collaboration:completed`
    CollaborationCompleted,
    /// `collaboration:expired`
    CollaborationExpired,
    /// `collaboration:broadcast`
    CollaborationBroadcast,
    /// `collaboration:finding:shared`
    FindingShared,
}

impl EventKind {
    /// Every kind, in declaration order. Handy for wildcard subscribers.
    pub const ALL: [EventKind; 22] = [
        EventKind::TaskSubmitted,
        EventKind::TaskAssigned,
        EventKind::TaskStarted,
        EventKind::TaskCompleted,
        EventKind::TaskFailed,
        EventKind::TaskRetryScheduled,
        EventKind::TaskPriorityChanged,
        EventKind::AgentFailureHandled,
        EventKind::TeamForming,
        EventKind::TeamFormed,
        EventKind::TeamMemberJoined,
        EventKind::TeamMemberLeft,
        EventKind::TeamMemberStatusChanged,
        EventKind::TeamDissolved,
        EventKind::HelpRequested,
        EventKind::ReviewRequested,
        EventKind::EscalationRaised,
        EventKind::CollaborationResponse,
        EventKind::CollaborationCompleted,
        EventKind::CollaborationExpired,
        EventKind::CollaborationBroadcast,
        EventKind::FindingShared,
    ];

    /// The public event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskSubmitted => "task:submitted",
            EventKind::TaskAssigned => "task:assigned",
            EventKind::TaskStarted => "task:started",
            EventKind::TaskCompleted => "task:completed",
            EventKind::TaskFailed => "task:failed",
            EventKind::TaskRetryScheduled => "task:retry_scheduled",
            EventKind::TaskPriorityChanged => "task:priority_changed",
            EventKind::AgentFailureHandled => "task:agent_failure_handled",
            EventKind::TeamForming => "team:forming",
            EventKind::TeamFormed => "team:formed",
            EventKind::TeamMemberJoined => "team:member:joined",
            EventKind::TeamMemberLeft => "team:member:left",
            EventKind::TeamMemberStatusChanged => "team:member:status_changed",
            EventKind::TeamDissolved => "team:dissolved",
            EventKind::HelpRequested => "collaboration:help:requested",
            EventKind::ReviewRequested => "collaboration:review:requested",
            EventKind::EscalationRaised => "collaboration:escalation",
            EventKind::CollaborationResponse => "collaboration:response",
            EventKind::CollaborationCompleted => "collaboration:completed",
            EventKind::CollaborationExpired => "collaboration:expired",
            EventKind::CollaborationBroadcast => "collaboration:broadcast",
            EventKind::FindingShared => "collaboration:finding:shared",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
