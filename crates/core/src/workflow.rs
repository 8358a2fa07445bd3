//! Workflow records: a named, recurring check bound to a set of hosts.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow.
///
/// `Hold -> Running` and `Running -> Hold` are driven by the scheduler API.
/// `Recommending` is set by model recommendation outside this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Hold,
    Running,
    Recommending,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Hold => "hold",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Recommending => "recommending",
        };
        f.write_str(s)
    }
}

/// Addressing info for one checked host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub host_ip: String,
    pub host_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
}

/// Hosts a workflow runs against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(default)]
    pub domain: String,
    /// host_id -> host info.
    #[serde(default)]
    pub hosts: HashMap<String, HostInfo>,
}

/// Model bindings of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDetail {
    /// host_id -> metric -> model_id.
    #[serde(default)]
    pub singlecheck: HashMap<String, HashMap<String, String>>,
    /// host_id -> model_id of the multi-item check.
    #[serde(default)]
    pub multicheck: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diag: Option<String>,
}

/// Metadata about a bound model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub algo_name: String,
    #[serde(default)]
    pub algo_id: String,
}

/// A stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub workflow_name: String,
    pub username: String,
    #[serde(default)]
    pub description: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub input: WorkflowInput,
    /// Length of each check window and the trigger period, in seconds.
    #[serde(default = "default_step")]
    pub step: u64,
    /// Look-back used by model recommendation.
    #[serde(default = "default_period")]
    pub period: u64,
    #[serde(default)]
    pub alert: serde_json::Value,
    #[serde(default)]
    pub detail: WorkflowDetail,
    /// model_id -> model metadata.
    #[serde(default)]
    pub model_info: HashMap<String, ModelInfo>,
    #[serde(default = "Utc::now")]
    pub create_time: DateTime<Utc>,
}

fn default_step() -> u64 {
    60
}

fn default_period() -> u64 {
    900
}

impl Workflow {
    /// Build a held workflow with no hosts.
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            username: username.into(),
            description: String::new(),
            status: WorkflowStatus::Hold,
            app_name: String::new(),
            app_id: String::new(),
            input: WorkflowInput::default(),
            step: default_step(),
            period: default_period(),
            alert: serde_json::Value::Null,
            detail: WorkflowDetail::default(),
            model_info: HashMap::new(),
            create_time: Utc::now(),
        }
    }

    /// Generate a fresh workflow id.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Model id bound to a host's multi-item check.
    pub fn model_for_host(&self, host_id: &str) -> Option<&str> {
        self.detail.multicheck.get(host_id).map(String::as_str)
    }

    pub fn host_ids(&self) -> impl Iterator<Item = &str> {
        self.input.hosts.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Recommending).unwrap(),
            "\"recommending\""
        );
        assert_eq!(WorkflowStatus::Running.to_string(), "running");
    }

    #[test]
    fn minimal_record_fills_defaults() {
        let json = r#"{
            "workflow_id": "wf1",
            "workflow_name": "network",
            "username": "admin",
            "status": "hold",
            "input": {"domain": "g1", "hosts": {"h1": {"host_ip": "127.0.0.1", "host_name": "h1"}}},
            "detail": {"multicheck": {"h1": "m1"}}
        }"#;
        let wf: Workflow = serde_json::from_str(json).unwrap();
        assert_eq!(wf.step, 60);
        assert_eq!(wf.period, 900);
        assert_eq!(wf.model_for_host("h1"), Some("m1"));
        assert_eq!(wf.model_for_host("h2"), None);
        assert_eq!(wf.host_ids().collect::<Vec<_>>(), vec!["h1"]);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(Workflow::generate_id(), Workflow::generate_id());
    }
}
