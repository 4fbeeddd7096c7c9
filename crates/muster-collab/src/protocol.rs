use muster_bus::{EventBus, SubscriptionId};
use muster_core::{
    BusEvent, CollaborationReply, CollaborationRequest, EventKind, Finding, FindingScope,
    MusterError, MusterResult, RequestKind, RequestStatus, TaskPriority,
};
use muster_team::{TeamManager, WorkspaceStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning knobs for the collaboration protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Timeout applied when a request does not specify one.
    pub default_timeout_ms: u64,
    /// How often the background sweeper looks for expired requests.
    pub sweep_interval_ms: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            sweep_interval_ms: 5_000,
        }
    }
}

/// An agent's registration for incoming collaboration requests.
///
/// Covers all three request kinds, filtered to requests addressed to the
/// agent. Dropping the handle leaves the registration active; call
/// [`RequestSubscription::cancel`] to remove it.
pub struct RequestSubscription {
    bus: Arc<EventBus>,
    entries: Vec<(EventKind, SubscriptionId)>,
}

impl RequestSubscription {
    /// Unregister the handler from every request kind.
    pub fn cancel(self) {
        let Self { bus, entries } = self;
        for (kind, id) in entries {
            bus.unsubscribe(kind, id);
        }
    }
}

/// A pending request's reply channel and its monotonic deadline.
///
/// Deadlines are tracked on the tokio clock, not wall time, so expiry
/// behaves under `tokio::time::pause`. The wall-clock deadline on the
/// request record itself is informational.
struct Waiter {
    reply_tx: oneshot::Sender<CollaborationReply>,
    deadline: Instant,
}

#[derive(Default)]
struct CollabState {
    requests: HashMap<Uuid, CollaborationRequest>,
    /// Present for exactly the requests still in `Pending`.
    waiters: HashMap<Uuid, Waiter>,
    /// to_agent_id -> pending request ids, in arrival order.
    pending_by_agent: HashMap<String, Vec<Uuid>>,
}

impl CollabState {
    /// Drop the waiter and index entry for a request leaving `Pending`.
    fn clear_pending(&mut self, to_agent_id: &str, request_id: Uuid) -> Option<Waiter> {
        if let Some(ids) = self.pending_by_agent.get_mut(to_agent_id) {
            ids.retain(|id| *id != request_id);
            if ids.is_empty() {
                self.pending_by_agent.remove(to_agent_id);
            }
        }
        self.waiters.remove(&request_id)
    }
}

struct CollabInner {
    bus: Arc<EventBus>,
    teams: Arc<TeamManager>,
    workspaces: Arc<dyn WorkspaceStore>,
    config: CollabConfig,
    state: RwLock<CollabState>,
}

impl CollabInner {
    /// Resolve the timeout path for one request. No-op unless still pending.
    async fn expire(&self, request_id: Uuid) {
        {
            let mut state = self.state.write().await;
            let Some(request) = state.requests.get_mut(&request_id) else {
                return;
            };
            if request.status != RequestStatus::Pending {
                return;
            }
            request.status = RequestStatus::Expired;
            let to_agent = request.to_agent_id.clone();
            state.clear_pending(&to_agent, request_id);
        }
        warn!(request_id = %request_id, "Collaboration request expired");
        self.bus.publish(&BusEvent::CollaborationExpired { request_id });
    }

    /// Expire every pending request past its deadline.
    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut resolved = Vec::new();
        {
            let mut state = self.state.write().await;
            let due: Vec<Uuid> = state
                .waiters
                .iter()
                .filter(|(_, waiter)| waiter.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            for request_id in due {
                let to_agent = match state.requests.get_mut(&request_id) {
                    Some(request) => {
                        request.status = RequestStatus::Expired;
                        request.to_agent_id.clone()
                    }
                    None => continue,
                };
                let waiter = state.clear_pending(&to_agent, request_id);
                resolved.push((request_id, waiter));
            }
        }
        let count = resolved.len();
        for (request_id, waiter) in resolved {
            if let Some(waiter) = waiter {
                // The requester may have timed out on its own already.
                let _ = waiter.reply_tx.send(CollaborationReply::timed_out());
            }
            warn!(request_id = %request_id, "Collaboration request expired");
            self.bus.publish(&BusEvent::CollaborationExpired { request_id });
        }
        count
    }

    /// Write a finding into every workspace of its project.
    async fn persist_finding(&self, finding: &Finding) -> MusterResult<()> {
        let content = serde_json::to_string_pretty(finding)?;
        let key = format!("findings/{}.json", finding.id);
        let workspaces = self
            .workspaces
            .workspaces_for_project(&finding.project_id)
            .await?;
        for workspace in workspaces {
            self.workspaces
                .update_artifact(&workspace.id, &key, &content)
                .await?;
        }
        Ok(())
    }
}

/// Opens, answers, and expires agent-to-agent requests.
///
/// Requests travel as bus events; replies travel back over a per-request
/// channel. The waiter is installed before the request event is published,
/// so a handler that responds immediately (even from inside the publishing
/// call stack) still finds the request pending.
pub struct CollaborationProtocol {
    inner: Arc<CollabInner>,
    sweeper: JoinHandle<()>,
}

impl CollaborationProtocol {
    /// Creates the protocol and starts its background expiry sweeper.
    ///
    /// The sweeper only matters for requests whose requester is not
    /// waiting (escalations opened fire-and-forget); a waiting requester
    /// resolves its own timeout.
    pub fn new(
        bus: Arc<EventBus>,
        teams: Arc<TeamManager>,
        workspaces: Arc<dyn WorkspaceStore>,
        config: CollabConfig,
    ) -> Self {
        let sweep_every = Duration::from_millis(config.sweep_interval_ms.max(1));
        let inner = Arc::new(CollabInner {
            bus,
            teams,
            workspaces,
            config,
            state: RwLock::new(CollabState::default()),
        });
        let weak = Arc::downgrade(&inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.sweep_expired().await;
            }
        });
        Self { inner, sweeper }
    }

    /// Register a handler for requests addressed to `agent_id`.
    ///
    /// The handler runs synchronously on the publisher's call stack; spawn
    /// a task before calling back into the protocol to respond.
    pub fn on_request<F>(&self, agent_id: &str, handler: F) -> RequestSubscription
    where
        F: Fn(&CollaborationRequest) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let kinds = [
            EventKind::HelpRequested,
            EventKind::ReviewRequested,
            EventKind::EscalationRaised,
        ];
        let mut entries = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let handler = Arc::clone(&handler);
            let agent_id = agent_id.to_string();
            let id = self.inner.bus.subscribe(kind, move |event| {
                let request = match event {
                    BusEvent::HelpRequested { request }
                    | BusEvent::ReviewRequested { request }
                    | BusEvent::EscalationRaised { request } => request,
                    _ => return Ok(()),
                };
                if request.to_agent_id == agent_id {
                    handler(request);
                }
                Ok(())
            });
            entries.push((kind, id));
        }
        RequestSubscription {
            bus: Arc::clone(&self.inner.bus),
            entries,
        }
    }

    /// Ask another agent for help and wait for its reply.
    ///
    /// Returns the timeout reply if no answer arrives within `timeout_ms`
    /// (or the configured default when `None`).
    pub async fn request_help(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_ms: Option<u64>,
    ) -> CollaborationReply {
        let timeout = timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        let request = CollaborationRequest::new(
            RequestKind::Help,
            from_agent_id,
            to_agent_id,
            payload,
            priority,
            timeout,
        );
        self.await_reply(request).await
    }

    /// Ask another agent for a review and wait for its reply.
    pub async fn request_review(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_ms: Option<u64>,
    ) -> CollaborationReply {
        let timeout = timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        let request = CollaborationRequest::new(
            RequestKind::Review,
            from_agent_id,
            to_agent_id,
            payload,
            priority,
            timeout,
        );
        self.await_reply(request).await
    }

    /// Escalate a problem to the lead of the team serving `project_id` and
    /// wait for the lead's reply.
    ///
    /// Fails if the project has no team or the team has no lead member.
    pub async fn escalate(
        &self,
        from_agent_id: &str,
        project_id: &str,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_ms: Option<u64>,
    ) -> MusterResult<CollaborationReply> {
        let lead = self.resolve_lead(project_id).await?;
        info!(
            from = from_agent_id,
            project_id, lead = %lead, "Escalating to team lead"
        );
        let timeout = timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        let request = CollaborationRequest::new(
            RequestKind::Escalation,
            from_agent_id,
            lead,
            payload,
            priority,
            timeout,
        );
        Ok(self.await_reply(request).await)
    }

    /// Escalate without waiting for the reply, returning the request id.
    ///
    /// The request stays pending until the lead responds or the sweeper
    /// expires it.
    pub async fn open_escalation(
        &self,
        from_agent_id: &str,
        project_id: &str,
        payload: serde_json::Value,
        priority: TaskPriority,
    ) -> MusterResult<Uuid> {
        let lead = self.resolve_lead(project_id).await?;
        info!(
            from = from_agent_id,
            project_id, lead = %lead, "Escalating to team lead"
        );
        let request = CollaborationRequest::new(
            RequestKind::Escalation,
            from_agent_id,
            lead,
            payload,
            priority,
            self.inner.config.default_timeout_ms,
        );
        let request_id = request.id;
        drop(self.begin(request).await);
        Ok(request_id)
    }

    /// Answer a pending request, waking its requester.
    ///
    /// Answering an unknown or already-resolved request is a no-op
    /// returning `false`; losing that race is expected in a live system.
    pub async fn respond(&self, request_id: Uuid, reply: CollaborationReply) -> bool {
        let (waiter, accepted) = {
            let mut state = self.inner.state.write().await;
            let Some(request) = state.requests.get_mut(&request_id) else {
                warn!(request_id = %request_id, "Response to unknown collaboration request");
                return false;
            };
            if request.status != RequestStatus::Pending {
                warn!(
                    request_id = %request_id,
                    status = %request.status,
                    "Response to a request that is no longer pending"
                );
                return false;
            }
            request.status = if reply.accepted {
                RequestStatus::Accepted
            } else {
                RequestStatus::Rejected
            };
            let to_agent = request.to_agent_id.clone();
            let waiter = state.clear_pending(&to_agent, request_id);
            (waiter, reply.accepted)
        };
        if let Some(waiter) = waiter {
            // Fire-and-forget requesters dropped their receiver.
            let _ = waiter.reply_tx.send(reply);
        }
        self.inner.bus.publish(&BusEvent::CollaborationResponse {
            request_id,
            accepted,
        });
        true
    }

    /// Attach a result to an accepted request and close it out.
    /// Returns `false` unless the request is currently accepted.
    pub async fn complete_request(&self, request_id: Uuid, result: serde_json::Value) -> bool {
        {
            let mut state = self.inner.state.write().await;
            let Some(request) = state.requests.get_mut(&request_id) else {
                warn!(request_id = %request_id, "Completion for unknown collaboration request");
                return false;
            };
            if request.status != RequestStatus::Accepted {
                warn!(
                    request_id = %request_id,
                    status = %request.status,
                    "Completion for a request that was never accepted"
                );
                return false;
            }
            request.status = RequestStatus::Completed;
            request.result = Some(result.clone());
        }
        self.inner.bus.publish(&BusEvent::CollaborationCompleted {
            request_id,
            result,
        });
        true
    }

    /// Send a fire-and-forget message to everyone listening on the bus.
    /// Returns the number of subscribers notified.
    pub fn broadcast(
        &self,
        from_agent_id: &str,
        message: &str,
        context: Option<serde_json::Value>,
    ) -> usize {
        self.inner.bus.publish(&BusEvent::CollaborationBroadcast {
            from_agent_id: from_agent_id.to_string(),
            message: message.to_string(),
            context,
        })
    }

    /// Share a finding on the bus and persist it into the project's
    /// workspaces. The announcement goes out synchronously; persistence runs
    /// on a spawned task so the caller never waits on store acknowledgement,
    /// and a store failure is logged, not fatal.
    pub fn share_finding(
        &self,
        from_agent_id: &str,
        finding: Finding,
        scope: FindingScope,
    ) -> usize {
        let inner = Arc::clone(&self.inner);
        let record = finding.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.persist_finding(&record).await {
                warn!(finding_id = %record.id, error = %e, "Failed to persist finding");
            }
        });
        info!(
            finding_id = %finding.id,
            severity = %finding.severity,
            scope = ?scope,
            "Finding shared"
        );
        self.inner.bus.publish(&BusEvent::FindingShared {
            from_agent_id: from_agent_id.to_string(),
            finding,
            scope,
        })
    }

    /// Pending requests addressed to an agent, in arrival order.
    pub async fn pending_for(&self, agent_id: &str) -> Vec<CollaborationRequest> {
        let state = self.inner.state.read().await;
        state
            .pending_by_agent
            .get(agent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.requests.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of one request, whatever its status.
    pub async fn get_request(&self, request_id: Uuid) -> Option<CollaborationRequest> {
        let state = self.inner.state.read().await;
        state.requests.get(&request_id).cloned()
    }

    /// Run one expiry sweep immediately. The background sweeper calls this
    /// on its own cadence; exposed for callers that cannot wait for it.
    pub async fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired().await
    }

    async fn resolve_lead(&self, project_id: &str) -> MusterResult<String> {
        let team = self
            .inner
            .teams
            .team_for_project(project_id)
            .await
            .ok_or_else(|| {
                MusterError::Collab(format!("no team serving project '{project_id}'"))
            })?;
        let lead = team.lead().ok_or_else(|| {
            MusterError::Collab(format!("team '{}' has no member in its lead role", team.name))
        })?;
        Ok(lead.agent_id.clone())
    }

    /// Install the waiter, record the request, then publish its event.
    async fn begin(&self, request: CollaborationRequest) -> oneshot::Receiver<CollaborationReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let deadline = Instant::now() + Duration::from_millis(request.timeout_ms);
        {
            let mut state = self.inner.state.write().await;
            state
                .waiters
                .insert(request.id, Waiter { reply_tx, deadline });
            state
                .pending_by_agent
                .entry(request.to_agent_id.clone())
                .or_default()
                .push(request.id);
            state.requests.insert(request.id, request.clone());
        }
        debug!(
            request_id = %request.id,
            kind = %request.kind,
            from = %request.from_agent_id,
            to = %request.to_agent_id,
            timeout_ms = request.timeout_ms,
            "Collaboration request opened"
        );
        let event = match request.kind {
            RequestKind::Help => BusEvent::HelpRequested { request },
            RequestKind::Review => BusEvent::ReviewRequested { request },
            RequestKind::Escalation => BusEvent::EscalationRaised { request },
        };
        self.inner.bus.publish(&event);
        reply_rx
    }

    async fn await_reply(&self, request: CollaborationRequest) -> CollaborationReply {
        let request_id = request.id;
        let wait = Duration::from_millis(request.timeout_ms);
        let reply_rx = self.begin(request).await;
        match tokio::time::timeout(wait, reply_rx).await {
            Ok(Ok(reply)) => reply,
            // Waiter dropped without an answer; the sweep already closed it.
            Ok(Err(_)) => CollaborationReply::timed_out(),
            Err(_) => {
                self.inner.expire(request_id).await;
                CollaborationReply::timed_out()
            }
        }
    }
}

impl Drop for CollaborationProtocol {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
