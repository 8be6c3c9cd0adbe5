//! Host protocol: the execution request we are launched with and the
//! terminal result record we answer with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Execution request as serialized by the host into our first argument.
/// Only `args` and `variables` drive the run; the rest is informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
    /// Flat `key=value` flags for the executor.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub variables: Variables,
}

impl Execution {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Debug output is switched on by the literal `verbose=true` flag.
    pub fn wants_debug(&self) -> bool {
        self.args.iter().any(|a| a == "verbose=true")
    }
}

pub type Variables = BTreeMap<String, Variable>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<VariableType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ObjectRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Basic,
    Secret,
}

/// Reference to a kubernetes secret or config map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Passed,
    Failed,
    Aborting,
    Aborted,
    Timeout,
}

impl ExecutionStatus {
    /// Passed only when nothing failed and nothing errored.
    pub fn from_results(results: &OverallResults) -> Self {
        if results.failed == 0 && results.errored == 0 {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl ExecutionResult {
    /// `errorMessage` is present if and only if the status is `failed`.
    pub fn new(status: ExecutionStatus, output: &str, message: Option<&str>) -> Self {
        let error_message = match status {
            ExecutionStatus::Failed => Some(message.unwrap_or(output).to_string()),
            _ => None,
        };
        Self {
            status,
            output: output.to_string(),
            error_message,
            time: OffsetDateTime::now_utc(),
        }
    }
}

/// Aggregated counts reported by the engine at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OverallResults {
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub submitted: u64,
}

impl OverallResults {
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} errored, {} pending, {} submitted",
            self.passed, self.failed, self.errored, self.pending, self.submitted
        )
    }
}
