use async_trait::async_trait;
use muster_core::MusterResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A workspace provisioned for a team by the external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    /// Provider-assigned workspace id.
    pub id: String,
    /// The project the workspace belongs to.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
}

/// Interface to the external workspace/versioning store.
/// Implementations can be in-memory (testing) or backed by a real provider.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Provision a workspace for a project.
    async fn provision(&self, project_id: &str, name: &str) -> MusterResult<WorkspaceInfo>;

    /// All workspaces belonging to a project.
    async fn workspaces_for_project(&self, project_id: &str) -> MusterResult<Vec<WorkspaceInfo>>;

    /// Write an artifact into a workspace, returning the new version number.
    async fn update_artifact(
        &self,
        workspace_id: &str,
        key: &str,
        content: &str,
    ) -> MusterResult<u64>;
}

/// In-memory workspace store for testing and single-process runs.
pub struct InMemoryWorkspaceStore {
    workspaces: RwLock<HashMap<String, WorkspaceInfo>>,
    /// (workspace_id, key) -> (version, content)
    artifacts: RwLock<HashMap<(String, String), (u64, String)>>,
}

impl InMemoryWorkspaceStore {
    pub fn new() -> Self {
        Self {
            workspaces: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// Read back an artifact, for assertions in tests.
    pub async fn artifact(&self, workspace_id: &str, key: &str) -> Option<(u64, String)> {
        let artifacts = self.artifacts.read().await;
        artifacts
            .get(&(workspace_id.to_string(), key.to_string()))
            .cloned()
    }
}

impl Default for InMemoryWorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn provision(&self, project_id: &str, name: &str) -> MusterResult<WorkspaceInfo> {
        let info = WorkspaceInfo {
            id: format!("ws-{}", Uuid::new_v4()),
            project_id: project_id.to_string(),
            name: name.to_string(),
        };
        let mut workspaces = self.workspaces.write().await;
        workspaces.insert(info.id.clone(), info.clone());
        Ok(info)
    }

    async fn workspaces_for_project(&self, project_id: &str) -> MusterResult<Vec<WorkspaceInfo>> {
        let workspaces = self.workspaces.read().await;
        let mut found: Vec<WorkspaceInfo> = workspaces
            .values()
            .filter(|ws| ws.project_id == project_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn update_artifact(
        &self,
        workspace_id: &str,
        key: &str,
        content: &str,
    ) -> MusterResult<u64> {
        let mut artifacts = self.artifacts.write().await;
        let entry = artifacts
            .entry((workspace_id.to_string(), key.to_string()))
            .or_insert((0, String::new()));
        entry.0 += 1;
        entry.1 = content.to_string();
        Ok(entry.0)
    }
}
