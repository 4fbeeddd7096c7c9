use chrono::{DateTime, Duration, Utc};
use muster_core::{EstimatedEffort, TaskPriority};
use muster_match::TaskRequirement;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task in the queue.
///
/// Legal transitions: `queued → assigned → in_progress → completed`,
/// `queued → assigned → in_progress → failed`, and `failed → queued`
/// while retries remain. Anything else is rejected by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for an agent.
    Queued,
    /// Handed to an agent, not yet started.
    Assigned,
    /// An agent is working on it.
    InProgress,
    /// Finished with a result.
    Completed,
    /// Failed; terminal once retries are exhausted.
    Failed,
}

impl TaskStatus {
    /// Whether no further transition can leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Submission input for a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// External reference for the task (ticket id, span id, ...).
    pub task_id: String,
    /// What needs doing. Also mined for capability keywords when no
    /// explicit requirements are given.
    pub description: String,
    /// Capabilities the task explicitly requires.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Urgency class, feeding the computed queue priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Optional completion deadline.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Rough size of the work.
    #[serde(default)]
    pub estimated_effort: EstimatedEffort,
    /// Project this task belongs to, if any.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Per-task retry cap; the router's policy default applies when unset.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl TaskSpec {
    /// Creates a spec with defaults for everything but id and description.
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            required_capabilities: Vec::new(),
            priority: TaskPriority::default(),
            deadline: None,
            estimated_effort: EstimatedEffort::default(),
            project_id: None,
            max_retries: None,
        }
    }

    /// Sets explicit capability requirements.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Sets the urgency class.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets a completion deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the effort estimate.
    pub fn with_effort(mut self, effort: EstimatedEffort) -> Self {
        self.estimated_effort = effort;
        self
    }

    /// Attaches the task to a project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Overrides the retry cap for this task.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// A task as the router tracks it, from submission to terminal state.
///
/// Records are never deleted on completion; they stay for audit and for
/// `queue_status` aggregation. `clear()` on the router is the only bulk
/// removal path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Router-internal id; bus events reference this.
    pub id: Uuid,
    /// External reference from the submission.
    pub task_id: String,
    /// What needs doing.
    pub description: String,
    /// Explicit capability requirements from the submission.
    pub required_capabilities: Vec<String>,
    /// Queue priority in `[1, 100]`, computed at submission.
    pub priority: u32,
    /// Urgency class the priority was computed from.
    pub priority_class: TaskPriority,
    /// Effort estimate from the submission.
    pub estimated_effort: EstimatedEffort,
    /// Optional completion deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Project this task belongs to, if any.
    pub project_id: Option<String>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Agent currently holding the task.
    pub assigned_agent_id: Option<String>,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Retries allowed before failure is terminal.
    pub max_retries: u32,
    /// Worker-reported result, present once completed.
    pub result: Option<serde_json::Value>,
    /// Most recent worker-reported error.
    pub error: Option<String>,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When the task completed, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueuedTask {
    /// Builds the queued record for a submission.
    pub fn from_spec(spec: TaskSpec, priority: u32, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: spec.task_id,
            description: spec.description,
            required_capabilities: spec.required_capabilities,
            priority,
            priority_class: spec.priority,
            estimated_effort: spec.estimated_effort,
            deadline: spec.deadline,
            project_id: spec.project_id,
            status: TaskStatus::Queued,
            assigned_agent_id: None,
            retry_count: 0,
            max_retries,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The matcher's view of this task. `capabilities` should be the
    /// explicit requirements, or keywords mined from the description when
    /// there are none.
    pub fn requirement(&self, capabilities: Vec<String>) -> TaskRequirement {
        let mut requirement = TaskRequirement::new(&self.task_id, &self.description)
            .with_priority(self.priority_class)
            .with_effort(self.estimated_effort)
            .with_capabilities(capabilities);
        if let Some(deadline) = self.deadline {
            requirement = requirement.with_deadline(deadline);
        }
        requirement
    }
}

/// Queue priority for a submission: a base of 50 plus bonuses for urgency
/// class, deadline proximity, and effort, clamped into `[1, 100]`.
pub fn compute_priority(spec: &TaskSpec, now: DateTime<Utc>) -> u32 {
    let priority_bonus = match spec.priority {
        TaskPriority::Critical => 50,
        TaskPriority::High => 30,
        TaskPriority::Medium => 10,
        TaskPriority::Low => 0,
    };
    let urgency_bonus = match spec.deadline {
        Some(deadline) => {
            let remaining = deadline - now;
            if remaining < Duration::days(1) {
                20
            } else if remaining < Duration::days(3) {
                10
            } else {
                0
            }
        }
        None => 0,
    };
    let effort_bonus = match spec.estimated_effort {
        EstimatedEffort::Small => 0,
        EstimatedEffort::Medium => 5,
        EstimatedEffort::Large => 10,
    };
    (50u32 + priority_bonus + urgency_bonus + effort_bonus).clamp(1, 100)
}
