use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Task classification ---

/// Priority class attached to a task at submission time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work with no urgency.
    Low,
    /// Normal work. The default when submitters don't say otherwise.
    #[default]
    Medium,
    /// Work that should jump most of the queue.
    High,
    /// Drop-everything work.
    Critical,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Coarse effort estimate for a task, used when computing queue priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedEffort {
    /// Under an hour of agent time.
    Small,
    /// Up to a working day.
    #[default]
    Medium,
    /// Multi-day work.
    Large,
}

impl std::fmt::Display for EstimatedEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimatedEffort::Small => write!(f, "small"),
            EstimatedEffort::Medium => write!(f, "medium"),
            EstimatedEffort::Large => write!(f, "large"),
        }
    }
}

// --- Member status ---

/// Live status of an agent within a team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Reachable and free to take work.
    #[default]
    Idle,
    /// Reachable but currently working a task.
    Busy,
    /// Deliberately taken out of rotation.
    Offline,
    /// Crashed or unresponsive.
    Error,
}

impl MemberStatus {
    /// Whether the agent cannot currently be reached for work or collaboration.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, MemberStatus::Offline | MemberStatus::Error)
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Idle => write!(f, "idle"),
            MemberStatus::Busy => write!(f, "busy"),
            MemberStatus::Offline => write!(f, "offline"),
            MemberStatus::Error => write!(f, "error"),
        }
    }
}

// --- Collaboration ---

/// The kind of help one agent is asking of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// "I'm stuck, can you unblock me."
    Help,
    /// "Please review this artifact."
    Review,
    /// A problem raised to the team lead.
    Escalation,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Help => write!(f, "help"),
            RequestKind::Review => write!(f, "review"),
            RequestKind::Escalation => write!(f, "escalation"),
        }
    }
}

/// Lifecycle state of a [`CollaborationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for the target agent to answer.
    Pending,
    /// The target agreed to take it on.
    Accepted,
    /// The target declined.
    Rejected,
    /// No answer arrived within the request's timeout.
    Expired,
    /// Accepted work was finished and a result attached.
    Completed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Accepted => write!(f, "accepted"),
            RequestStatus::Rejected => write!(f, "rejected"),
            RequestStatus::Expired => write!(f, "expired"),
            RequestStatus::Completed => write!(f, "completed"),
        }
    }
}

/// An agent-to-agent ask: help, review, or an escalation to the team lead.
///
/// Requests are addressed to exactly one agent and carry a free-form JSON
/// payload describing the ask. A request that receives no response within
/// `timeout_ms` is resolved as expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationRequest {
    /// Unique identifier for this request.
    pub id: Uuid,
    /// The agent asking.
    pub from_agent_id: String,
    /// The agent being asked.
    pub to_agent_id: String,
    /// What is being asked.
    pub kind: RequestKind,
    /// Free-form JSON describing the ask (context, artifact refs, question).
    pub payload: serde_json::Value,
    /// How urgent the ask is.
    pub priority: TaskPriority,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// UTC timestamp of when the request was opened.
    pub created_at: DateTime<Utc>,
    /// How long the requester is willing to wait for a response.
    pub timeout_ms: u64,
    /// Result attached when the request is completed.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl CollaborationRequest {
    /// Opens a new pending request.
    pub fn new(
        kind: RequestKind,
        from_agent_id: impl Into<String>,
        to_agent_id: impl Into<String>,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent_id: from_agent_id.into(),
            to_agent_id: to_agent_id.into(),
            kind,
            payload,
            priority,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            timeout_ms,
            result: None,
        }
    }

    /// The instant after which this request counts as expired.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.created_at + Duration::milliseconds(self.timeout_ms as i64)
    }

    /// Whether the request has outlived its timeout as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}

/// The requester-facing resolution of a [`CollaborationRequest`].
///
/// Every request resolves to exactly one reply: the target's answer, or the
/// canonical timeout reply when no answer arrived in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationReply {
    /// Whether the target agreed to the ask.
    pub accepted: bool,
    /// Optional JSON attached by the responder.
    pub payload: Option<serde_json::Value>,
    /// Optional human-readable note from the responder.
    pub message: Option<String>,
}

impl CollaborationReply {
    /// An affirmative reply, optionally carrying responder data.
    pub fn accepted(payload: Option<serde_json::Value>) -> Self {
        Self {
            accepted: true,
            payload,
            message: None,
        }
    }

    /// A negative reply with an explanation.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            payload: None,
            message: Some(message.into()),
        }
    }

    /// The reply a requester receives when the request times out.
    pub fn timed_out() -> Self {
        Self {
            accepted: false,
            payload: None,
            message: Some("Request timed out".to_string()),
        }
    }
}

// --- Findings ---

/// Severity of a shared finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    /// Informational, no action needed.
    Info,
    /// Minor issue.
    Low,
    /// Should be addressed this iteration.
    Medium,
    /// Should be addressed before shipping.
    High,
    /// Blocks the project.
    Critical,
}

impl std::fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingSeverity::Info => write!(f, "info"),
            FindingSeverity::Low => write!(f, "low"),
            FindingSeverity::Medium => write!(f, "medium"),
            FindingSeverity::High => write!(f, "high"),
            FindingSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Who a shared finding is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingScope {
    /// The finder's own team.
    Team,
    /// Every team on the same project.
    Project,
    /// Everyone listening on the bus.
    Global,
}

/// A discovery one agent wants others to know about: a bug, a blocked
/// dependency, a security concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique identifier for this finding.
    pub id: Uuid,
    /// Free-form category ("bug", "blocker", "security", ...).
    pub kind: String,
    /// How serious it is.
    pub severity: FindingSeverity,
    /// One-line summary.
    pub title: String,
    /// Full description.
    pub description: String,
    /// The project this finding belongs to.
    pub project_id: String,
}

impl Finding {
    /// Creates a new finding.
    pub fn new(
        kind: impl Into<String>,
        severity: FindingSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            severity,
            title: title.into(),
            description: description.into(),
            project_id: project_id.into(),
        }
    }
}
