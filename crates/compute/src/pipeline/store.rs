//! Workflow persistence.
//!
//! [`MemoryWorkflowStore`] keeps records in process; [`JsonWorkflowStore`]
//! additionally rewrites a JSON array file after every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vigil_core::{Result, VigilError, Workflow, WorkflowStatus};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow>;

    /// All workflows, or only those in `status`.
    async fn get_all_workflow_list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>>;

    async fn update_workflow_status(&self, workflow_id: &str, status: WorkflowStatus) -> Result<()>;

    async fn insert_workflow(&self, workflow: Workflow) -> Result<()>;

    /// Refused while the workflow is running.
    async fn delete_workflow(&self, workflow_id: &str) -> Result<()>;
}

// ── Shared table ─────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct WorkflowTable {
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowTable {
    fn from_list(list: Vec<Workflow>) -> Self {
        let workflows = list
            .into_iter()
            .map(|w| (w.workflow_id.clone(), w))
            .collect();
        Self { workflows }
    }

    fn get(&self, workflow_id: &str) -> Result<Workflow> {
        self.workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| VigilError::WorkflowNotFound(workflow_id.to_string()))
    }

    fn list(&self, status: Option<WorkflowStatus>) -> Vec<Workflow> {
        self.workflows
            .values()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .cloned()
            .collect()
    }

    fn set_status(&mut self, workflow_id: &str, status: WorkflowStatus) -> Result<()> {
        let workflow = self
            .workflows
            .get_mut(workflow_id)
            .ok_or_else(|| VigilError::WorkflowNotFound(workflow_id.to_string()))?;
        workflow.status = status;
        Ok(())
    }

    fn insert(&mut self, workflow: Workflow) -> Result<()> {
        if self.workflows.contains_key(&workflow.workflow_id) {
            return Err(VigilError::WorkflowExists(workflow.workflow_id));
        }
        self.workflows.insert(workflow.workflow_id.clone(), workflow);
        Ok(())
    }

    fn delete(&mut self, workflow_id: &str) -> Result<()> {
        match self.workflows.get(workflow_id) {
            None => Err(VigilError::WorkflowNotFound(workflow_id.to_string())),
            Some(w) if w.status == WorkflowStatus::Running => {
                Err(VigilError::WorkflowRunning(workflow_id.to_string()))
            }
            Some(_) => {
                self.workflows.remove(workflow_id);
                Ok(())
            }
        }
    }

    fn to_json(&self) -> Result<String> {
        let list: Vec<&Workflow> = self.workflows.values().collect();
        Ok(serde_json::to_string_pretty(&list)?)
    }
}

// ── In-memory store ──────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    table: RwLock<WorkflowTable>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflows(list: Vec<Workflow>) -> Self {
        Self {
            table: RwLock::new(WorkflowTable::from_list(list)),
        }
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        self.table.read().await.get(workflow_id)
    }

    async fn get_all_workflow_list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>> {
        Ok(self.table.read().await.list(status))
    }

    async fn update_workflow_status(&self, workflow_id: &str, status: WorkflowStatus) -> Result<()> {
        self.table.write().await.set_status(workflow_id, status)
    }

    async fn insert_workflow(&self, workflow: Workflow) -> Result<()> {
        self.table.write().await.insert(workflow)
    }

    async fn delete_workflow(&self, workflow_id: &str) -> Result<()> {
        self.table.write().await.delete(workflow_id)
    }
}

// ── JSON file store ──────────────────────────────────────────

#[derive(Debug)]
pub struct JsonWorkflowStore {
    path: PathBuf,
    table: RwLock<WorkflowTable>,
}

impl JsonWorkflowStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => WorkflowTable::default(),
            Ok(text) => {
                let list: Vec<Workflow> = serde_json::from_str(&text)?;
                WorkflowTable::from_list(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "workflow store file missing, starting empty");
                WorkflowTable::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            workflows = table.workflows.len(),
            "workflow store opened"
        );
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write through a sibling temp file so readers never see a partial file.
    async fn persist(&self, table: &WorkflowTable) -> Result<()> {
        let json = table.to_json()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the table and swap it in only once the
    /// copy is on disk. A failed write leaves memory and file in agreement.
    async fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut WorkflowTable) -> Result<()> + Send,
    {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        change(&mut next)?;
        if let Err(e) = self.persist(&next).await {
            warn!(path = %self.path.display(), error = %e, "workflow store write failed, change dropped");
            return Err(e);
        }
        *table = next;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for JsonWorkflowStore {
    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        self.table.read().await.get(workflow_id)
    }

    async fn get_all_workflow_list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>> {
        Ok(self.table.read().await.list(status))
    }

    async fn update_workflow_status(&self, workflow_id: &str, status: WorkflowStatus) -> Result<()> {
        self.commit(|table| table.set_status(workflow_id, status)).await
    }

    async fn insert_workflow(&self, workflow: Workflow) -> Result<()> {
        self.commit(|table| table.insert(workflow)).await
    }

    async fn delete_workflow(&self, workflow_id: &str) -> Result<()> {
        self.commit(|table| table.delete(workflow_id)).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn workflow(id: &str, status: WorkflowStatus) -> Workflow {
        let mut w = Workflow::new(id, format!("{id} name"), "admin");
        w.status = status;
        w
    }

    #[tokio::test]
    async fn memory_store_filters_by_status() {
        let store = MemoryWorkflowStore::with_workflows(vec![
            workflow("a", WorkflowStatus::Running),
            workflow("b", WorkflowStatus::Hold),
        ]);
        let running = store
            .get_all_workflow_list(Some(WorkflowStatus::Running))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].workflow_id, "a");
        assert_eq!(store.get_all_workflow_list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let store = MemoryWorkflowStore::new();
        assert!(matches!(
            store.get_workflow("ghost").await,
            Err(VigilError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            store
                .update_workflow_status("ghost", WorkflowStatus::Running)
                .await,
            Err(VigilError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryWorkflowStore::new();
        store
            .insert_workflow(workflow("a", WorkflowStatus::Hold))
            .await
            .unwrap();
        assert!(matches!(
            store
                .insert_workflow(workflow("a", WorkflowStatus::Hold))
                .await,
            Err(VigilError::WorkflowExists(_))
        ));
    }

    #[tokio::test]
    async fn running_workflow_cannot_be_deleted() {
        let store = MemoryWorkflowStore::with_workflows(vec![workflow("a", WorkflowStatus::Running)]);
        assert!(matches!(
            store.delete_workflow("a").await,
            Err(VigilError::WorkflowRunning(_))
        ));

        store
            .update_workflow_status("a", WorkflowStatus::Hold)
            .await
            .unwrap();
        store.delete_workflow("a").await.unwrap();
        assert!(store.get_all_workflow_list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_store_persists_mutations() {
        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("nested").join("workflows.json");

        let store = JsonWorkflowStore::open(&path).await.unwrap();
        assert!(store.get_all_workflow_list(None).await.unwrap().is_empty());
        store
            .insert_workflow(workflow("a", WorkflowStatus::Hold))
            .await
            .unwrap();
        store
            .update_workflow_status("a", WorkflowStatus::Running)
            .await
            .unwrap();

        let reopened = JsonWorkflowStore::open(&path).await.unwrap();
        let a = reopened.get_workflow("a").await.unwrap();
        assert_eq!(a.status, WorkflowStatus::Running);
        assert_eq!(a.workflow_name, "a name");
        assert_eq!(reopened.path(), path.as_path());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("workflows.json");
        let store = JsonWorkflowStore::open(&path).await.unwrap();
        store
            .insert_workflow(workflow("a", WorkflowStatus::Hold))
            .await
            .unwrap();

        // A regular file where the store's directory should be makes every write fail
        let blocked = dir.path().join("blocked");
        tokio::fs::write(&blocked, "").await.unwrap();
        let broken = JsonWorkflowStore {
            path: blocked.join("workflows.json"),
            table: RwLock::new(store.table.read().await.clone()),
        };

        assert!(broken
            .update_workflow_status("a", WorkflowStatus::Running)
            .await
            .is_err());
        assert_eq!(
            broken.get_workflow("a").await.unwrap().status,
            WorkflowStatus::Hold
        );
        assert!(broken
            .insert_workflow(workflow("b", WorkflowStatus::Hold))
            .await
            .is_err());
        assert!(broken.delete_workflow("a").await.is_err());
        assert_eq!(broken.get_all_workflow_list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_store_rejects_garbage() {
        let dir = TempDir::new().expect("create tempdir");
        let path = dir.path().join("workflows.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            JsonWorkflowStore::open(&path).await,
            Err(VigilError::Serialize(_))
        ));
    }
}
