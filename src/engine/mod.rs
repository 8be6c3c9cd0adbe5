//! Engine boundary: what the worker needs from a Ply engine, the sink its
//! progress is delivered to, and the process-backed engine we link in.

use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
};

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
};

use crate::{
    args::{PlyOptions, RunOptions},
    error::AdapterError,
    execution::OverallResults,
};

/// A discovered test unit, opaque to us (`file#suite~test` for Ply).
pub type Plyee = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Suite,
    Test,
    Outcome,
    Flow,
}

impl ProgressKind {
    pub fn event_id(self) -> &'static str {
        match self {
            Self::Suite => "ply.SuiteEvent",
            Self::Test => "ply.PlyEvent",
            Self::Outcome => "ply.OutcomeEvent",
            Self::Flow => "flowbee.FlowEvent",
        }
    }
}

pub const RESULTS_EVENT_ID: &str = "ply.PlyResults";

/// An error reported on the engine's progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFault {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Receives engine progress synchronously, in emission order.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, kind: ProgressKind, event: &Value);

    fn suite(&self, event: &Value) {
        self.progress(ProgressKind::Suite, event);
    }

    fn test(&self, event: &Value) {
        self.progress(ProgressKind::Test, event);
    }

    fn outcome(&self, event: &Value) {
        self.progress(ProgressKind::Outcome, event);
    }

    fn flow(&self, event: &Value) {
        self.progress(ProgressKind::Flow, event);
    }

    fn error(&self, fault: &EngineFault);

    /// Free-form engine chatter.
    fn log(&self, message: &str);
}

/// Test engine capability: find plyees, then run them while reporting to a sink.
pub trait Engine: Send + Sync {
    fn version(&self) -> impl Future<Output = String> + Send;

    fn find(
        &self,
        options: &PlyOptions,
        tests: &[String],
    ) -> impl Future<Output = Result<Vec<Plyee>>> + Send;

    fn run(
        &self,
        options: &PlyOptions,
        plyees: &[Plyee],
        run_options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> impl Future<Output = Result<OverallResults>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSource {
    /// `ply` resolved from `PATH`.
    Bundled,
    /// An engine install root; the executable is `<root>/bin/ply`.
    Path(PathBuf),
}

/// Line-oriented messages from `ply run`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineMessage {
    Suite { event: Value },
    Test { event: Value },
    Outcome { event: Value },
    Flow { event: Value },
    Error(EngineFault),
    Results { results: OverallResults },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Message(EngineMessage),
    Text(String),
}

pub fn engine_lines<R>(reader: R) -> Pin<Box<dyn Stream<Item = Result<EngineLine>> + Send>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(try_stream! {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EngineMessage>(line.trim()) {
                Ok(message) => yield EngineLine::Message(message),
                Err(_) => yield EngineLine::Text(line),
            }
        }
    })
}

/// Drives an external Ply executable over stdin/stdout JSON.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    source: EngineSource,
    program: PathBuf,
}

impl ProcessEngine {
    pub const PROGRAM: &'static str = "ply";

    pub fn new(source: EngineSource) -> Self {
        let program = match &source {
            EngineSource::Bundled => PathBuf::from(Self::PROGRAM),
            EngineSource::Path(root) => root.join("bin").join(Self::PROGRAM),
        };
        Self { source, program }
    }

    /// Override paths are resolved against the current directory.
    pub fn locate(ply_path: Option<&Path>) -> Result<Self> {
        let source = match ply_path {
            Some(path) => EngineSource::Path(
                std::path::absolute(path)
                    .with_context(|| format!("resolving PLY_PATH {}", path.display()))?,
            ),
            None => EngineSource::Bundled,
        };
        Ok(Self::new(source))
    }

    pub fn source(&self) -> &EngineSource {
        &self.source
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn spawn(&self, command: &str, payload: &Value) -> Result<Child> {
        let mut child = Command::new(&self.program)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AdapterError::Engine(format!(
                    "failed to start {} {}: {}",
                    self.program.display(),
                    command,
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = serde_json::to_vec(payload)?;
            if let Err(err) = stdin.write_all(&body).await {
                tracing::debug!(%err, command, "engine closed stdin early");
            }
        }
        Ok(child)
    }
}

impl Engine for ProcessEngine {
    async fn version(&self) -> String {
        let out = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await;
        match out {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if version.is_empty() {
                    "unknown".into()
                } else {
                    version
                }
            }
            _ => "unknown".into(),
        }
    }

    async fn find(&self, options: &PlyOptions, tests: &[String]) -> Result<Vec<Plyee>> {
        let child = self
            .spawn("find", &json!({ "options": options, "tests": tests }))
            .await?;
        let out = child.wait_with_output().await.context("waiting for ply find")?;
        if !out.status.success() {
            return Err(AdapterError::Engine(format!(
                "ply find exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))
            .into());
        }
        let plyees = serde_json::from_slice(&out.stdout)
            .map_err(|e| AdapterError::Engine(format!("unexpected ply find output: {e}")))?;
        Ok(plyees)
    }

    async fn run(
        &self,
        options: &PlyOptions,
        plyees: &[Plyee],
        run_options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<OverallResults> {
        let payload = json!({ "options": options, "plyees": plyees, "runOptions": run_options });
        let mut child = self.spawn("run", &payload).await?;
        let stdout = child.stdout.take().context("ply run stdout unavailable")?;
        let mut stderr = child.stderr.take().context("ply run stderr unavailable")?;
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            stderr.read_to_string(&mut text).await.map(|_| text)
        });

        let mut results = None;
        let mut lines = engine_lines(stdout);
        while let Some(line) = lines.next().await {
            match line? {
                EngineLine::Message(EngineMessage::Suite { event }) => sink.suite(&event),
                EngineLine::Message(EngineMessage::Test { event }) => sink.test(&event),
                EngineLine::Message(EngineMessage::Outcome { event }) => sink.outcome(&event),
                EngineLine::Message(EngineMessage::Flow { event }) => sink.flow(&event),
                EngineLine::Message(EngineMessage::Error(fault)) => sink.error(&fault),
                EngineLine::Message(EngineMessage::Results { results: r }) => results = Some(r),
                EngineLine::Text(text) => sink.log(&text),
            }
        }

        let status = child.wait().await.context("waiting for ply run")?;
        let stderr = match stderr_task.await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        };
        if !status.success() {
            return Err(AdapterError::Engine(format!(
                "ply run exited with {}: {}",
                status,
                stderr.trim()
            ))
            .into());
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = stderr.trim(), "ply run stderr");
        }
        results.ok_or_else(|| {
            AdapterError::Engine(format!("ply run ended without results: {}", stderr.trim())).into()
        })
    }
}
