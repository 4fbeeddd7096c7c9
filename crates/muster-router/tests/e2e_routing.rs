//! End-to-end routing test.
//!
//! Wires the full stack: event bus, capability matcher, team manager,
//! collaboration protocol, and task router. Checks: event ordering across a
//! task lifecycle, availability-aware matching, retry backoff and
//! reassignment, agent failure recovery with lead escalation, and queue
//! rebalancing after a team forms.

use chrono::Utc;
use muster_bus::EventBus;
use muster_collab::{CollabConfig, CollaborationProtocol};
use muster_core::{BusEvent, EventKind, MemberStatus, RequestKind, TaskPriority};
use muster_match::{Capability, CapabilityComplexity, CapabilityMatcher};
use muster_router::{RetryPolicy, TaskRouter, TaskSpec, TaskStatus};
use muster_team::{InMemoryWorkspaceStore, RoleMapping, TeamManager, TeamPlan, WorkspaceStore};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fixture — one fully wired stack with a three-role team
// ---------------------------------------------------------------------------

struct Stack {
    bus: Arc<EventBus>,
    teams: Arc<TeamManager>,
    collab: Arc<CollaborationProtocol>,
    router: TaskRouter,
}

fn matcher() -> CapabilityMatcher {
    let mut m = CapabilityMatcher::new();
    m.register_capability(
        Capability::new("frontend", "Interface work", CapabilityComplexity::Moderate)
            .with_keywords(vec!["ui".to_string(), "dashboard".to_string()]),
    );
    m.register_capability(
        Capability::new("backend", "Service work", CapabilityComplexity::Moderate)
            .with_keywords(vec!["api".to_string(), "server".to_string()]),
    );
    m.register_capability(
        Capability::new("planning", "Coordination", CapabilityComplexity::Simple)
            .with_keywords(vec!["roadmap".to_string()]),
    );
    m
}

fn stack_with_policy(policy: RetryPolicy) -> Stack {
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
        Arc::new(matcher()),
        Arc::clone(&teams),
        Arc::clone(&collab),
        policy,
    );
    Stack {
        bus,
        teams,
        collab,
        router,
    }
}

fn stack() -> Stack {
    stack_with_policy(RetryPolicy::default())
}

/// Lead holds planning+backend; the other two agents hold one skill each.
async fn seed_team(stack: &Stack) -> Uuid {
    for (role_id, agent_id, capabilities) in [
        ("lead", "agent-lead", vec!["planning", "backend"]),
        ("frontend", "agent-fe", vec!["frontend"]),
        ("backend", "agent-be", vec!["backend"]),
    ] {
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
        .unwrap()
}

fn record_event_names(bus: &EventBus, kinds: &[EventKind]) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let recorder = Arc::clone(&seen);
        bus.subscribe(*kind, move |event| {
            recorder.lock().unwrap().push(event.kind().as_str());
            Ok(())
        });
    }
    seen
}

// ---------------------------------------------------------------------------
// Test: Happy path — submitted, assigned, started, completed, in that order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_lifecycle_event_order() {
    let s = stack();
    seed_team(&s).await;
    let events = record_event_names(
        &s.bus,
        &[
            EventKind::TaskSubmitted,
            EventKind::TaskAssigned,
            EventKind::TaskStarted,
            EventKind::TaskCompleted,
            EventKind::TaskFailed,
        ],
    );

    let task_id = s
        .router
        .submit(
            TaskSpec::new("PAY-101", "redesign the billing dashboard")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::High)
                .with_project("proj-1"),
        )
        .await;
    assert!(s.router.start(task_id, "agent-fe").await);
    assert!(s.router.complete(task_id, json!({"merged": true})).await);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "task:submitted",
            "task:assigned",
            "task:started",
            "task:completed"
        ]
    );

    let status = s.router.queue_status().await;
    assert_eq!(status.completed, 1);
    assert_eq!(status.total, 1);

    let team = s.teams.team_for_project("proj-1").await.unwrap();
    assert_eq!(team.member("agent-fe").unwrap().status, MemberStatus::Idle);
}

// ---------------------------------------------------------------------------
// Test: Matching weighs availability — busy capable agent loses to idle one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_critical_task_prefers_idle_specialist() {
    let s = stack();
    seed_team(&s).await;

    // Tie up the lead, who also holds backend, with an unrelated chore.
    let chore = s
        .router
        .submit(TaskSpec::new("OPS-1", "quarterly filing"))
        .await;
    assert!(s.router.assign(chore, Some("agent-lead")).await);

    let task_id = s
        .router
        .submit(
            TaskSpec::new("PAY-201", "hotfix the payments api")
                .with_capabilities(vec!["backend".to_string()])
                .with_priority(TaskPriority::Critical)
                .with_project("proj-1"),
        )
        .await;

    let task = s.router.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.assigned_agent_id.as_deref(), Some("agent-be"));
    assert!(task.priority >= 80);
}

// ---------------------------------------------------------------------------
// Test: Two failures walk the backoff ladder, then the task completes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_e2e_retry_ladder_reassigns_with_growing_delays() {
    let s = stack();
    seed_team(&s).await;
    let delays: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&delays);
    s.bus.subscribe(EventKind::TaskRetryScheduled, move |event| {
        if let BusEvent::TaskRetryScheduled { delay_ms, .. } = event {
            recorder.lock().unwrap().push(*delay_ms);
        }
        Ok(())
    });

    let task_id = s
        .router
        .submit(
            TaskSpec::new("PAY-301", "rebuild the ui kit")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::Critical),
        )
        .await;

    assert!(s.router.start(task_id, "agent-fe").await);
    assert!(s.router.fail(task_id, "bundler crash").await);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(
        s.router.get_task(task_id).await.unwrap().status,
        TaskStatus::Assigned
    );

    assert!(s.router.start(task_id, "agent-fe").await);
    assert!(s.router.fail(task_id, "bundler crash again").await);
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let task = s.router.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.retry_count, 2);

    assert!(s.router.start(task_id, "agent-fe").await);
    assert!(s.router.complete(task_id, json!({"fixed": true})).await);
    assert_eq!(*delays.lock().unwrap(), vec![1_000, 2_000]);
}

// ---------------------------------------------------------------------------
// Test: Policy retry budget runs out — failure becomes terminal
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_e2e_retries_exhaust_to_terminal_failure() {
    let s = stack_with_policy(RetryPolicy {
        max_retries: 1,
        initial_delay_ms: 100,
        max_delay_ms: 1_000,
    });
    seed_team(&s).await;
    let events = record_event_names(&s.bus, &[EventKind::TaskFailed]);

    let task_id = s
        .router
        .submit(
            TaskSpec::new("PAY-302", "refresh the ui theme")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::High)
                .with_project("proj-1"),
        )
        .await;

    assert!(s.router.fail(task_id, "first failure").await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(s.router.fail(task_id, "second failure").await);

    let task = s.router.get_task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.error.as_deref(), Some("second failure"));
    assert_eq!(*events.lock().unwrap(), vec!["task:failed"]);

    let team = s.teams.team_for_project("proj-1").await.unwrap();
    assert_eq!(team.member("agent-fe").unwrap().status, MemberStatus::Idle);
    assert_eq!(s.router.queue_status().await.failed, 1);
}

// ---------------------------------------------------------------------------
// Test: Agent failure — live work re-queued, finished work untouched,
// unassignable urgent work escalated to the team lead
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_agent_failure_requeues_and_escalates() {
    let s = stack();
    let team_id = seed_team(&s).await;

    let escalations: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&escalations);
    s.bus.subscribe(EventKind::EscalationRaised, move |event| {
        if let BusEvent::EscalationRaised { request } = event {
            recorder.lock().unwrap().push(request.to_agent_id.clone());
        }
        Ok(())
    });

    // One task the agent already finished.
    let done = s
        .router
        .submit(
            TaskSpec::new("PAY-401", "polish the admin ui")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::High)
                .with_project("proj-1"),
        )
        .await;
    assert!(s.router.start(done, "agent-fe").await);
    assert!(s.router.complete(done, json!({"pr": 41})).await);

    // One critical task in flight when the agent dies.
    let stranded = s
        .router
        .submit(
            TaskSpec::new("PAY-402", "rescue the checkout ui")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::Critical)
                .with_project("proj-1"),
        )
        .await;
    assert!(s.router.start(stranded, "agent-fe").await);

    assert!(
        s.teams
            .update_member_status(team_id, "agent-fe", MemberStatus::Error)
            .await
    );
    assert_eq!(s.router.handle_agent_failure("agent-fe").await, 0);

    // The in-flight task went back to the queue; nobody else does frontend.
    let task = s.router.get_task(stranded).await.unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.assigned_agent_id.is_none());

    // The finished task kept its result.
    let done_task = s.router.get_task(done).await.unwrap();
    assert_eq!(done_task.status, TaskStatus::Completed);
    assert_eq!(done_task.result, Some(json!({"pr": 41})));

    // The critical stranded task reached the lead as an open escalation.
    assert_eq!(*escalations.lock().unwrap(), vec!["agent-lead"]);
    let pending = s.collab.pending_for("agent-lead").await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, RequestKind::Escalation);
    assert_eq!(pending[0].from_agent_id, "task-router");
}

// ---------------------------------------------------------------------------
// Test: Rebalance drains a queue that predates the team
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_rebalance_after_team_forms() {
    let s = stack();

    let api_fix = s
        .router
        .submit(
            TaskSpec::new("OPS-11", "patch the api gateway")
                .with_capabilities(vec!["backend".to_string()])
                .with_priority(TaskPriority::Critical),
        )
        .await;
    let api_chore = s
        .router
        .submit(
            TaskSpec::new("OPS-12", "rotate server certs")
                .with_capabilities(vec!["backend".to_string()]),
        )
        .await;
    let ui_fix = s
        .router
        .submit(
            TaskSpec::new("OPS-13", "unbreak the ui tests")
                .with_capabilities(vec!["frontend".to_string()])
                .with_priority(TaskPriority::High),
        )
        .await;
    for id in [api_fix, api_chore, ui_fix] {
        assert_eq!(s.router.get_task(id).await.unwrap().status, TaskStatus::Queued);
    }

    seed_team(&s).await;
    assert_eq!(s.router.rebalance().await, 3);

    // Highest priority first: the critical fix takes the lead (first in
    // roster order among equals), the chore then falls to the idle backend.
    let fix = s.router.get_task(api_fix).await.unwrap();
    assert_eq!(fix.assigned_agent_id.as_deref(), Some("agent-lead"));
    let ui = s.router.get_task(ui_fix).await.unwrap();
    assert_eq!(ui.assigned_agent_id.as_deref(), Some("agent-fe"));
    let chore = s.router.get_task(api_chore).await.unwrap();
    assert_eq!(chore.assigned_agent_id.as_deref(), Some("agent-be"));

    let status = s.router.queue_status().await;
    assert_eq!(status.queued, 0);
    assert_eq!(status.assigned, 3);
}

// ---------------------------------------------------------------------------
// Test: Per-agent ordering — priority, then deadline, then submission age
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_next_task_ordering_for_agent() {
    let s = stack();
    seed_team(&s).await;

    // Three keyword-free chores assigned by hand to the same agent.
    let low = s
        .router
        .submit(TaskSpec::new("CHORE-1", "sort the cupboard"))
        .await;
    let due_soon = s
        .router
        .submit(
            TaskSpec::new("CHORE-2", "collect the parcels")
                .with_deadline(Utc::now() + chrono::Duration::hours(20)),
        )
        .await;
    let no_deadline = s
        .router
        .submit(TaskSpec::new("CHORE-3", "sweep the yard"))
        .await;
    for id in [low, due_soon, no_deadline] {
        assert!(s.router.assign(id, Some("agent-be")).await);
    }
    assert!(s.router.set_priority(low, 70).await);
    assert!(s.router.set_priority(due_soon, 90).await);
    assert!(s.router.set_priority(no_deadline, 90).await);

    // Highest priority first; the deadline breaks the tie.
    let next = s.router.next_task_for_agent("agent-be").await.unwrap();
    assert_eq!(next.id, due_soon);

    // A raise jumps the queue.
    assert!(s.router.set_priority(low, 95).await);
    let next = s.router.next_task_for_agent("agent-be").await.unwrap();
    assert_eq!(next.id, low);

    // Equal priority, no deadlines: oldest submission first.
    assert!(s.router.complete(due_soon, json!({})).await);
    assert!(s.router.set_priority(low, 90).await);
    let next = s.router.next_task_for_agent("agent-be").await.unwrap();
    assert_eq!(next.id, low);
}

// ---------------------------------------------------------------------------
// Test: Agents without assigned work are offered matching queued tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_next_task_falls_back_to_open_queue() {
    let s = stack();
    // Queued before any team exists, so nothing could be assigned.
    let orphan = s
        .router
        .submit(
            TaskSpec::new("PAY-501", "tune the api cache")
                .with_capabilities(vec!["backend".to_string()]),
        )
        .await;
    seed_team(&s).await;

    let next = s.router.next_task_for_agent("agent-be").await.unwrap();
    assert_eq!(next.id, orphan);
    assert_eq!(next.status, TaskStatus::Queued);

    // No matching capability, or no team membership at all: nothing offered.
    assert!(s.router.next_task_for_agent("agent-fe").await.is_none());
    assert!(s.router.next_task_for_agent("agent-ghost").await.is_none());
}
