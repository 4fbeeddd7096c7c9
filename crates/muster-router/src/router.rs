use crate::retry::RetryPolicy;
use crate::task::{compute_priority, QueuedTask, TaskSpec, TaskStatus};
use crate::timer::TimerRegistry;
use chrono::Utc;
use muster_bus::EventBus;
use muster_collab::CollaborationProtocol;
use muster_core::BusEvent;
use muster_match::{AgentProfile, CapabilityMatcher, TaskRequirement};
use muster_team::TeamManager;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Requester name the router uses when escalating stranded tasks.
const ROUTER_AGENT_ID: &str = "task-router";

/// Tasks above this priority are escalated when no replacement agent can
/// be found after their agent fails.
const ESCALATION_PRIORITY_FLOOR: u32 = 80;

/// Aggregate queue counts plus the average submission-to-completion wait.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Tasks waiting for an agent.
    pub queued: usize,
    /// Tasks handed to an agent, not yet started.
    pub assigned: usize,
    /// Tasks being worked.
    pub in_progress: usize,
    /// Tasks finished with a result.
    pub completed: usize,
    /// Tasks that failed for good.
    pub failed: usize,
    /// Every task the router has seen and not cleared.
    pub total: usize,
    /// Mean `completed_at - created_at` across completed tasks, in ms.
    pub avg_wait_ms: u64,
}

#[derive(Default)]
struct RouterState {
    tasks: HashMap<Uuid, QueuedTask>,
    /// agent_id -> ids of tasks currently assigned to that agent
    agent_index: HashMap<String, Vec<Uuid>>,
}

/// Everything the routing logic needs, shared with retry timer callbacks
/// through a `Weak` so a dropped router cannot be resurrected by a timer.
struct RouterCtx {
    bus: Arc<EventBus>,
    matcher: Arc<CapabilityMatcher>,
    teams: Arc<TeamManager>,
    collab: Arc<CollaborationProtocol>,
    policy: RetryPolicy,
    state: RwLock<RouterState>,
    timers: TimerRegistry<Uuid>,
}

impl RouterCtx {
    /// The matcher's view of a task: explicit requirements, or keywords
    /// mined from the description when there are none.
    fn requirement_for(&self, task: &QueuedTask) -> TaskRequirement {
        let capabilities = if task.required_capabilities.is_empty() {
            self.matcher.parse_task_capabilities(&task.description)
        } else {
            task.required_capabilities.clone()
        };
        task.requirement(capabilities)
    }

    /// Top-ranked reachable candidate for a task across all teams.
    async fn find_best_agent(
        &self,
        task: &QueuedTask,
        exclude: &[&str],
    ) -> Option<(Uuid, String)> {
        let roster = self.teams.roster().await;
        let mut team_by_agent: HashMap<String, Uuid> = HashMap::new();
        let mut profiles = Vec::new();
        for (team_id, member) in roster {
            if exclude.contains(&member.agent_id.as_str()) {
                continue;
            }
            // An agent on several teams is considered once, first team wins.
            if team_by_agent.contains_key(&member.agent_id) {
                continue;
            }
            profiles.push(AgentProfile::new(
                &member.agent_id,
                &member.role_id,
                member.status,
                member.capabilities.clone(),
            ));
            team_by_agent.insert(member.agent_id.clone(), team_id);
        }

        let requirement = self.requirement_for(task);
        let ranked = self.matcher.rank(&requirement, &profiles);
        let best = ranked.first()?;
        debug!(
            task_id = %task.id,
            agent_id = %best.agent_id,
            score = best.score,
            reason = %best.reason,
            "Best candidate selected"
        );
        let team_id = team_by_agent.get(&best.agent_id)?;
        Some((*team_id, best.agent_id.clone()))
    }

    /// Core assignment step. Resolves a candidate (explicit or best match)
    /// without holding the state lock, then re-checks the task is still
    /// queued before committing.
    async fn try_assign(&self, task_id: Uuid, agent_id: Option<&str>, exclude: &[&str]) -> bool {
        let task = {
            let state = self.state.read().await;
            match state.tasks.get(&task_id) {
                Some(task) if task.status == TaskStatus::Queued => task.clone(),
                Some(task) => {
                    debug!(task_id = %task_id, status = %task.status, "Assignment needs a queued task");
                    return false;
                }
                None => {
                    debug!(task_id = %task_id, "Assignment for unknown task");
                    return false;
                }
            }
        };

        let candidate = match agent_id {
            Some(agent) => self
                .teams
                .find_member(agent)
                .await
                .map(|(team_id, member)| (team_id, member.agent_id)),
            None => self.find_best_agent(&task, exclude).await,
        };
        let Some((team_id, agent)) = candidate else {
            debug!(task_id = %task_id, "No candidate agent");
            return false;
        };

        {
            let mut state = self.state.write().await;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                return false;
            };
            // The queue may have moved while we were matching.
            if task.status != TaskStatus::Queued {
                return false;
            }
            task.status = TaskStatus::Assigned;
            task.assigned_agent_id = Some(agent.clone());
            state.agent_index.entry(agent.clone()).or_default().push(task_id);
        }
        self.teams.assign_task(team_id, &agent, task_id).await;
        info!(task_id = %task_id, agent_id = %agent, "Task assigned");
        self.bus.publish(&BusEvent::TaskAssigned {
            task_id,
            agent_id: agent,
        });
        true
    }

    /// Retry timer callback: the task is due for another assignment attempt.
    async fn retry_due(&self, task_id: Uuid) {
        let still_queued = {
            let state = self.state.read().await;
            state
                .tasks
                .get(&task_id)
                .is_some_and(|task| task.status == TaskStatus::Queued)
        };
        if still_queued {
            debug!(task_id = %task_id, "Retry timer fired");
            self.try_assign(task_id, None, &[]).await;
        }
    }

    /// Release a member back to idle after its task left them.
    async fn release_member(&self, agent_id: &str) {
        if let Some((team_id, _)) = self.teams.find_member(agent_id).await {
            self.teams.clear_task(team_id, agent_id).await;
        }
    }
}

/// The task queue and its routing logic.
///
/// All state lives behind one lock; every mutation publishes its event
/// after the lock is released, so bus subscribers observe a consistent
/// queue and may call back into the router.
pub struct TaskRouter {
    ctx: Arc<RouterCtx>,
}

impl TaskRouter {
    /// Creates a router wired to its collaborators.
    pub fn new(
        bus: Arc<EventBus>,
        matcher: Arc<CapabilityMatcher>,
        teams: Arc<TeamManager>,
        collab: Arc<CollaborationProtocol>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ctx: Arc::new(RouterCtx {
                bus,
                matcher,
                teams,
                collab,
                policy,
                state: RwLock::new(RouterState::default()),
                timers: TimerRegistry::new(),
            }),
        }
    }

    /// Submit a task: compute its priority, enqueue it, announce it, and
    /// immediately try to assign it. Returns the router-internal task id.
    pub async fn submit(&self, spec: TaskSpec) -> Uuid {
        let priority = compute_priority(&spec, Utc::now());
        let max_retries = spec.max_retries.unwrap_or(self.ctx.policy.max_retries);
        let task = QueuedTask::from_spec(spec, priority, max_retries);
        let task_id = task.id;
        let timestamp = task.created_at;
        {
            let mut state = self.ctx.state.write().await;
            state.tasks.insert(task_id, task);
        }
        info!(task_id = %task_id, priority, "Task submitted");
        self.ctx.bus.publish(&BusEvent::TaskSubmitted {
            task_id,
            priority,
            timestamp,
        });
        self.ctx.try_assign(task_id, None, &[]).await;
        task_id
    }

    /// Assign a queued task, to `agent_id` if given, otherwise to the best
    /// matching agent. `false` if the task is not queued or nobody fits.
    pub async fn assign(&self, task_id: Uuid, agent_id: Option<&str>) -> bool {
        self.ctx.try_assign(task_id, agent_id, &[]).await
    }

    /// Mark an assigned task as started by its agent.
    pub async fn start(&self, task_id: Uuid, agent_id: &str) -> bool {
        {
            let mut state = self.ctx.state.write().await;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Start for unknown task");
                return false;
            };
            if task.status != TaskStatus::Assigned
                || task.assigned_agent_id.as_deref() != Some(agent_id)
            {
                warn!(
                    task_id = %task_id,
                    status = %task.status,
                    agent_id,
                    "Start requires the task to be assigned to this agent"
                );
                return false;
            }
            task.status = TaskStatus::InProgress;
        }
        self.ctx.bus.publish(&BusEvent::TaskStarted {
            task_id,
            agent_id: agent_id.to_string(),
        });
        true
    }

    /// Record a task's successful result and free its agent.
    pub async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> bool {
        let (agent_id, project_id) = {
            let mut state = self.ctx.state.write().await;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Completion for unknown task");
                return false;
            };
            if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                warn!(task_id = %task_id, status = %task.status, "Completion for a task not in flight");
                return false;
            }
            let Some(agent_id) = task.assigned_agent_id.clone() else {
                warn!(task_id = %task_id, "In-flight task has no agent");
                return false;
            };
            task.status = TaskStatus::Completed;
            task.result = Some(result.clone());
            task.completed_at = Some(Utc::now());
            let project_id = task.project_id.clone();
            remove_from_index(&mut state.agent_index, &agent_id, task_id);
            (agent_id, project_id)
        };
        self.ctx.release_member(&agent_id).await;
        info!(task_id = %task_id, agent_id = %agent_id, "Task completed");
        self.ctx.bus.publish(&BusEvent::TaskCompleted {
            task_id,
            agent_id,
            result,
            project_id,
        });
        true
    }

    /// Record a task failure. Retries with backoff while attempts remain;
    /// otherwise the failure is terminal and `task:failed` is published.
    pub async fn fail(&self, task_id: Uuid, error: &str) -> bool {
        let (agent_id, can_retry) = {
            let mut state = self.ctx.state.write().await;
            let state = &mut *state;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Failure for unknown task");
                return false;
            };
            if !matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                warn!(task_id = %task_id, status = %task.status, "Failure for a task not in flight");
                return false;
            }
            let agent_id = task.assigned_agent_id.take();
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            if let Some(agent) = &agent_id {
                remove_from_index(&mut state.agent_index, agent, task_id);
            }
            (agent_id, task.retry_count < task.max_retries)
        };
        if let Some(agent) = &agent_id {
            self.ctx.release_member(agent).await;
        }
        warn!(task_id = %task_id, error, "Task failed");
        if can_retry {
            self.retry(task_id).await;
        } else {
            self.ctx.bus.publish(&BusEvent::TaskFailed {
                task_id,
                agent_id: agent_id.unwrap_or_default(),
                error: error.to_string(),
            });
        }
        true
    }

    /// Re-queue a failed task and schedule a delayed assignment attempt
    /// with exponential backoff. `false` once retries are exhausted.
    pub async fn retry(&self, task_id: Uuid) -> bool {
        let (retry_count, max_retries, delay_ms) = {
            let mut state = self.ctx.state.write().await;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Retry for unknown task");
                return false;
            };
            if task.status != TaskStatus::Failed {
                warn!(task_id = %task_id, status = %task.status, "Retry requires a failed task");
                return false;
            }
            if task.retry_count >= task.max_retries {
                debug!(task_id = %task_id, "Retries exhausted");
                return false;
            }
            task.retry_count += 1;
            task.status = TaskStatus::Queued;
            task.assigned_agent_id = None;
            (
                task.retry_count,
                task.max_retries,
                self.ctx.policy.backoff_delay_ms(task.retry_count),
            )
        };
        let ctx = Arc::downgrade(&self.ctx);
        self.ctx
            .timers
            .schedule(task_id, Duration::from_millis(delay_ms), async move {
                let Some(ctx) = ctx.upgrade() else {
                    return;
                };
                ctx.retry_due(task_id).await;
            });
        info!(task_id = %task_id, retry_count, delay_ms, "Retry scheduled");
        self.ctx.bus.publish(&BusEvent::TaskRetryScheduled {
            task_id,
            retry_count,
            max_retries,
            delay_ms,
        });
        true
    }

    /// The task an agent should pick up next: its own assigned work first
    /// (highest priority, then earliest deadline, then earliest submission),
    /// falling back to the oldest queued task it scores above zero on.
    pub async fn next_task_for_agent(&self, agent_id: &str) -> Option<QueuedTask> {
        let queued: Vec<QueuedTask> = {
            let state = self.ctx.state.read().await;
            let mut mine: Vec<&QueuedTask> = state
                .agent_index
                .get(agent_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| state.tasks.get(id))
                        .filter(|task| {
                            matches!(task.status, TaskStatus::Assigned | TaskStatus::Queued)
                        })
                        .collect()
                })
                .unwrap_or_default();
            if !mine.is_empty() {
                mine.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| match (a.deadline, b.deadline) {
                            (Some(x), Some(y)) => x.cmp(&y),
                            (Some(_), None) => std::cmp::Ordering::Less,
                            (None, Some(_)) => std::cmp::Ordering::Greater,
                            (None, None) => std::cmp::Ordering::Equal,
                        })
                        .then_with(|| a.created_at.cmp(&b.created_at))
                });
                return mine.first().map(|task| (*task).clone());
            }
            let mut queued: Vec<QueuedTask> = state
                .tasks
                .values()
                .filter(|task| task.status == TaskStatus::Queued)
                .cloned()
                .collect();
            queued.sort_by_key(|task| task.created_at);
            queued
        };

        let (_, member) = self.ctx.teams.find_member(agent_id).await?;
        let profile = AgentProfile::new(
            &member.agent_id,
            &member.role_id,
            member.status,
            member.capabilities,
        );
        queued.into_iter().find(|task| {
            let requirement = self.ctx.requirement_for(task);
            self.ctx.matcher.score(&requirement, &profile).score > 0
        })
    }

    /// Re-attempt assignment for every queued task, highest priority first.
    /// Returns how many found an agent.
    pub async fn rebalance(&self) -> usize {
        let mut queued: Vec<(Uuid, u32)> = {
            let state = self.ctx.state.read().await;
            state
                .tasks
                .values()
                .filter(|task| task.status == TaskStatus::Queued)
                .map(|task| (task.id, task.priority))
                .collect()
        };
        queued.sort_by(|a, b| b.1.cmp(&a.1));
        let mut assigned = 0;
        for (task_id, _) in queued {
            if self.ctx.try_assign(task_id, None, &[]).await {
                assigned += 1;
            }
        }
        info!(assigned, "Queue rebalanced");
        assigned
    }

    /// Recover from a failed agent: re-queue its live tasks, reassign them
    /// elsewhere, and escalate the urgent ones nobody can take. Returns how
    /// many tasks found a new agent.
    pub async fn handle_agent_failure(&self, agent_id: &str) -> usize {
        let stranded: Vec<Uuid> = {
            let mut state = self.ctx.state.write().await;
            let ids = state.agent_index.remove(agent_id).unwrap_or_default();
            let mut stranded = Vec::new();
            for task_id in ids {
                let Some(task) = state.tasks.get_mut(&task_id) else {
                    continue;
                };
                if task.status.is_terminal() {
                    continue;
                }
                task.status = TaskStatus::Queued;
                task.assigned_agent_id = None;
                stranded.push(task_id);
            }
            stranded
        };
        warn!(agent_id, stranded = stranded.len(), "Handling agent failure");

        let mut reassigned = 0;
        for task_id in stranded {
            if self.ctx.try_assign(task_id, None, &[agent_id]).await {
                reassigned += 1;
                continue;
            }
            self.escalate_stranded(task_id, agent_id).await;
        }
        self.ctx.bus.publish(&BusEvent::AgentFailureHandled {
            agent_id: agent_id.to_string(),
            tasks_reassigned: reassigned,
        });
        reassigned
    }

    /// Override a task's queue priority, clamped into `[1, 100]`.
    pub async fn set_priority(&self, task_id: Uuid, priority: u32) -> bool {
        let new_priority = priority.clamp(1, 100);
        let old_priority = {
            let mut state = self.ctx.state.write().await;
            let Some(task) = state.tasks.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Priority change for unknown task");
                return false;
            };
            let old = task.priority;
            task.priority = new_priority;
            old
        };
        info!(task_id = %task_id, old_priority, new_priority, "Task priority changed");
        self.ctx.bus.publish(&BusEvent::TaskPriorityChanged {
            task_id,
            old_priority,
            new_priority,
        });
        true
    }

    /// Aggregate queue counts. Pure read: calling it twice without an
    /// intervening mutation returns identical results.
    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.ctx.state.read().await;
        let mut status = QueueStatus::default();
        let mut wait_total_ms: i64 = 0;
        for task in state.tasks.values() {
            status.total += 1;
            match task.status {
                TaskStatus::Queued => status.queued += 1,
                TaskStatus::Assigned => status.assigned += 1,
                TaskStatus::InProgress => status.in_progress += 1,
                TaskStatus::Completed => {
                    status.completed += 1;
                    if let Some(done) = task.completed_at {
                        wait_total_ms += (done - task.created_at).num_milliseconds();
                    }
                }
                TaskStatus::Failed => status.failed += 1,
            }
        }
        if status.completed > 0 {
            status.avg_wait_ms = (wait_total_ms / status.completed as i64).max(0) as u64;
        }
        status
    }

    /// Snapshot of one task.
    pub async fn get_task(&self, task_id: Uuid) -> Option<QueuedTask> {
        let state = self.ctx.state.read().await;
        state.tasks.get(&task_id).cloned()
    }

    /// Snapshots of every task, oldest first.
    pub async fn all_tasks(&self) -> Vec<QueuedTask> {
        let state = self.ctx.state.read().await;
        let mut tasks: Vec<QueuedTask> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    /// Retry timers scheduled and not yet fired.
    pub fn pending_timers(&self) -> usize {
        self.ctx.timers.pending()
    }

    /// Drop every task and cancel outstanding retry timers. Reset path for
    /// tests and shutdowns; live systems keep their audit trail.
    pub async fn clear(&self) {
        let cancelled = self.ctx.timers.cancel_all();
        let mut state = self.ctx.state.write().await;
        let dropped = state.tasks.len();
        state.tasks.clear();
        state.agent_index.clear();
        info!(dropped, cancelled, "Router cleared");
    }

    /// Escalate a stranded high-priority task to its project's team lead.
    async fn escalate_stranded(&self, task_id: Uuid, failed_agent: &str) {
        let Some(task) = self.get_task(task_id).await else {
            return;
        };
        if task.priority <= ESCALATION_PRIORITY_FLOOR {
            return;
        }
        let Some(project_id) = task.project_id.as_deref() else {
            warn!(
                task_id = %task_id,
                priority = task.priority,
                "Unassignable task has no project to escalate through"
            );
            return;
        };
        let payload = serde_json::json!({
            "task_id": task.task_id,
            "description": task.description,
            "priority": task.priority,
            "reason": format!("agent '{failed_agent}' failed and no replacement is available"),
        });
        match self
            .ctx
            .collab
            .open_escalation(ROUTER_AGENT_ID, project_id, payload, task.priority_class)
            .await
        {
            Ok(request_id) => {
                info!(task_id = %task_id, request_id = %request_id, "Stranded task escalated");
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Escalation failed");
            }
        }
    }
}

fn remove_from_index(index: &mut HashMap<String, Vec<Uuid>>, agent_id: &str, task_id: Uuid) {
    if let Some(ids) = index.get_mut(agent_id) {
        ids.retain(|id| *id != task_id);
        if ids.is_empty() {
            index.remove(agent_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use muster_collab::CollabConfig;
    use muster_core::{EstimatedEffort, EventKind, MemberStatus, TaskPriority};
    use muster_match::{Capability, CapabilityComplexity};
    use muster_team::{InMemoryWorkspaceStore, RoleMapping, TeamPlan, WorkspaceStore};
    use serde_json::json;
    use std::sync::Mutex;

    struct Stack {
        bus: Arc<EventBus>,
        teams: Arc<TeamManager>,
        router: TaskRouter,
    }

    fn test_matcher() -> CapabilityMatcher {
        let mut matcher = CapabilityMatcher::new();
        matcher.register_capability(
            Capability::new("frontend", "UI work", CapabilityComplexity::Moderate).with_keywords(
                vec!["react".to_string(), "ui".to_string(), "css".to_string()],
            ),
        );
        matcher.register_capability(
            Capability::new("backend", "API work", CapabilityComplexity::Complex).with_keywords(
                vec!["api".to_string(), "database".to_string(), "server".to_string()],
            ),
        );
        matcher
    }

    fn stack() -> Stack {
        let bus = Arc::new(EventBus::new());
        let store: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
        let teams = Arc::new(TeamManager::new(Arc::clone(&bus), Arc::clone(&store)));
        let collab = Arc::new(CollaborationProtocol::new(
            Arc::clone(&bus),
            Arc::clone(&teams),
            store,
            CollabConfig::default(),
        ));
        let router = TaskRouter::new(
            Arc::clone(&bus),
            Arc::new(test_matcher()),
            Arc::clone(&teams),
            collab,
            RetryPolicy::default(),
        );
        Stack { bus, teams, router }
    }

    /// Lead (backend+planning), one frontend agent, one backend agent.
    async fn with_team(stack: &Stack) {
        let roles = [
            ("lead", "agent-lead", vec!["planning", "backend"]),
            ("frontend", "agent-fe", vec!["frontend"]),
            ("backend", "agent-be", vec!["backend"]),
        ];
        for (role_id, agent_id, capabilities) in roles {
            stack
                .teams
                .register_role_mapping(RoleMapping {
                    role_id: role_id.to_string(),
                    role_name: format!("Role {role_id}"),
                    agent_id: agent_id.to_string(),
                    capabilities: capabilities.into_iter().map(String::from).collect(),
                    veto_gates: Vec::new(),
                    approval_gates: Vec::new(),
                })
                .await;
        }
        stack
            .teams
            .form_team(&TeamPlan {
                project_id: "proj-1".to_string(),
                project_name: "Project One".to_string(),
                required_roles: vec![
                    "lead".to_string(),
                    "frontend".to_string(),
                    "backend".to_string(),
                ],
                lead_role_id: "lead".to_string(),
            })
            .await
            .unwrap();
    }

    fn record_kinds(bus: &EventBus, kinds: &[EventKind]) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let recorder = Arc::clone(&seen);
            bus.subscribe(*kind, move |event| {
                recorder.lock().unwrap().push(event.kind());
                Ok(())
            });
        }
        seen
    }

    fn frontend_task(priority: TaskPriority) -> TaskSpec {
        TaskSpec::new("ticket-1", "polish the dashboard UI")
            .with_capabilities(vec!["frontend".to_string()])
            .with_priority(priority)
            .with_project("proj-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_without_agents_stays_queued() {
        let s = stack();
        let seen = record_kinds(&s.bus, &[EventKind::TaskSubmitted, EventKind::TaskAssigned]);

        let task_id = s.router.submit(frontend_task(TaskPriority::High)).await;
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!((1..=100).contains(&task.priority));
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::TaskSubmitted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_auto_assigns_critical_frontend_task() {
        let s = stack();
        with_team(&s).await;
        let seen = record_kinds(&s.bus, &[EventKind::TaskSubmitted, EventKind::TaskAssigned]);

        let task_id = s
            .router
            .submit(frontend_task(TaskPriority::Critical).with_effort(EstimatedEffort::Small))
            .await;

        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent_id.as_deref(), Some("agent-fe"));
        assert!(task.priority >= 80);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::TaskSubmitted, EventKind::TaskAssigned]
        );

        // The member is flipped busy with the task recorded.
        let team = s.teams.team_for_project("proj-1").await.unwrap();
        let member = team.member("agent-fe").unwrap();
        assert_eq!(member.status, MemberStatus::Busy);
        assert_eq!(member.current_task, Some(task_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assign_explicit_agent_and_double_assign() {
        let s = stack();
        with_team(&s).await;

        // No explicit capabilities and no matching keywords: stays queued.
        let task_id = s
            .router
            .submit(TaskSpec::new("ticket-2", "mysterious chore"))
            .await;
        assert_eq!(
            s.router.get_task(task_id).await.unwrap().status,
            TaskStatus::Queued
        );

        assert!(s.router.assign(task_id, Some("agent-be")).await);
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.assigned_agent_id.as_deref(), Some("agent-be"));

        // Already assigned: a second assign is refused.
        assert!(!s.router.assign(task_id, Some("agent-fe")).await);
        // Unknown agent: refused.
        let other = s
            .router
            .submit(TaskSpec::new("ticket-3", "another chore"))
            .await;
        assert!(!s.router.assign(other, Some("agent-ghost")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_complete_lifecycle() {
        let s = stack();
        with_team(&s).await;
        let task_id = s.router.submit(frontend_task(TaskPriority::Medium)).await;

        // Only the assigned agent may start it.
        assert!(!s.router.start(task_id, "agent-be").await);
        assert!(s.router.start(task_id, "agent-fe").await);
        assert_eq!(
            s.router.get_task(task_id).await.unwrap().status,
            TaskStatus::InProgress
        );

        assert!(s.router.complete(task_id, json!({"pr": 17})).await);
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(json!({"pr": 17})));
        assert!(task.completed_at.is_some());

        // Completing twice is refused; the agent is idle again.
        assert!(!s.router.complete(task_id, json!({})).await);
        let team = s.teams.team_for_project("proj-1").await.unwrap();
        assert_eq!(team.member("agent-fe").unwrap().status, MemberStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_schedules_backoff_retry_and_reassigns() {
        let s = stack();
        with_team(&s).await;
        let retry_events = record_kinds(
            &s.bus,
            &[EventKind::TaskRetryScheduled, EventKind::TaskFailed],
        );
        let task_id = s.router.submit(frontend_task(TaskPriority::High)).await;
        assert!(s.router.start(task_id, "agent-fe").await);

        assert!(s.router.fail(task_id, "renderer crashed").await);
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.retry_count, 1);
        assert!(task.assigned_agent_id.is_none());
        assert_eq!(task.error.as_deref(), Some("renderer crashed"));
        assert_eq!(s.router.pending_timers(), 1);
        assert_eq!(
            *retry_events.lock().unwrap(),
            vec![EventKind::TaskRetryScheduled]
        );

        // First backoff step is 1s; after it fires the task is re-assigned.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent_id.as_deref(), Some("agent-fe"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_terminal() {
        let s = stack();
        with_team(&s).await;
        let seen = record_kinds(&s.bus, &[EventKind::TaskFailed]);
        let task_id = s
            .router
            .submit(frontend_task(TaskPriority::High).with_max_retries(0))
            .await;

        assert!(s.router.fail(task_id, "out of disk").await);
        let task = s.router.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 0);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::TaskFailed]);

        // No retry path left.
        assert!(!s.router.retry(task_id).await);
        assert_eq!(s.router.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_priority_clamps_and_publishes() {
        let s = stack();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&changes);
        s.bus
            .subscribe(EventKind::TaskPriorityChanged, move |event| {
                if let BusEvent::TaskPriorityChanged {
                    old_priority,
                    new_priority,
                    ..
                } = event
                {
                    recorder.lock().unwrap().push((*old_priority, *new_priority));
                }
                Ok(())
            });

        let task_id = s
            .router
            .submit(TaskSpec::new("ticket-4", "tune the cache"))
            .await;
        let initial = s.router.get_task(task_id).await.unwrap().priority;

        assert!(s.router.set_priority(task_id, 250).await);
        assert_eq!(s.router.get_task(task_id).await.unwrap().priority, 100);
        assert!(s.router.set_priority(task_id, 0).await);
        assert_eq!(s.router.get_task(task_id).await.unwrap().priority, 1);
        assert!(!s.router.set_priority(Uuid::new_v4(), 50).await);

        assert_eq!(*changes.lock().unwrap(), vec![(initial, 100), (100, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_status_is_idempotent() {
        let s = stack();
        with_team(&s).await;
        let done = s.router.submit(frontend_task(TaskPriority::Medium)).await;
        s.router.start(done, "agent-fe").await;
        s.router.complete(done, json!({})).await;
        s.router
            .submit(TaskSpec::new("ticket-5", "unmatchable chore"))
            .await;

        let first = s.router.queue_status().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = s.router.queue_status().await;
        assert_eq!(first, second);
        assert_eq!(first.completed, 1);
        assert_eq!(first.queued, 1);
        assert_eq!(first.total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_retry_timers() {
        let s = stack();
        with_team(&s).await;
        let task_id = s.router.submit(frontend_task(TaskPriority::High)).await;
        s.router.fail(task_id, "boom").await;
        assert_eq!(s.router.pending_timers(), 1);

        s.router.clear().await;
        assert_eq!(s.router.pending_timers(), 0);
        assert!(s.router.all_tasks().await.is_empty());
        // Nothing resurrects after the backoff window.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(s.router.get_task(task_id).await.is_none());
    }
}
