//! The execution worker: delay, diagnostics, dependency install, discovery,
//! then one engine run with progress forwarded to the output channel.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use serde_json::{json, Value};

use crate::{
    args::WorkerOptions,
    engine::{Engine, EngineFault, ProgressKind, ProgressSink, RESULTS_EVENT_ID},
    error::AdapterError,
    execution::{ExecutionStatus, OverallResults},
    locator::{FileMatcher, GlobMatcher, TestLocator},
    output::Output,
    process::{ToolOutput, Toolchain},
};

/// Progress sink writing `event` records. Engine errors are always logged;
/// progress forwarding can be switched off with `events=false`.
#[derive(Debug, Clone)]
pub struct OutputSink {
    output: Output,
    forward_events: bool,
}

impl OutputSink {
    pub fn new(output: Output, forward_events: bool) -> Self {
        Self { output, forward_events }
    }
}

impl ProgressSink for OutputSink {
    fn progress(&self, kind: ProgressKind, event: &Value) {
        if self.forward_events {
            self.output.event(kind.event_id(), event);
        }
    }

    fn error(&self, fault: &EngineFault) {
        match &fault.stack {
            Some(stack) => self.output.error_trace(&fault.message, stack),
            None => self.output.error(&fault.message),
        }
    }

    fn log(&self, message: &str) {
        self.output.info(message);
    }
}

pub struct PlyWorker<E> {
    output: Output,
    options: WorkerOptions,
    engine: E,
    locator: TestLocator,
    tools: Toolchain,
}

impl<E: Engine> PlyWorker<E> {
    pub fn new(output: Output, options: WorkerOptions, engine: E) -> Self {
        let locator = TestLocator::new(output.clone(), Arc::new(GlobMatcher));
        Self {
            output,
            options,
            engine,
            locator,
            tools: Toolchain::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn FileMatcher>) -> Self {
        self.locator = TestLocator::new(self.output.clone(), matcher);
        self
    }

    pub fn with_toolchain(mut self, tools: Toolchain) -> Self {
        self.tools = tools;
        self
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Runs the whole lifecycle once. Any step's failure ends the run.
    pub async fn run(&self, test_files: Option<&[String]>) -> Result<OverallResults> {
        if let Some(ms) = self.options.delay.filter(|ms| *ms > 0) {
            self.output.debug(format!("Delaying {ms} ms"));
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.output.debug_enabled() {
            self.git_branch().await;
        }
        if self.options.npm_install {
            self.npm_install().await?;
        }

        let ply_options = &self.options.ply_options;
        self.output.debug("Running ply tests...");
        let tests = self.locator.locate(ply_options, test_files).await?;
        self.output.debug_with("Tests", &tests);

        let cwd = std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|_| ".".into());
        self.output.info(format!(
            "Running ply {} in cwd: {}",
            self.engine.version().await,
            cwd
        ));

        let start = Instant::now();
        self.output.debug("Finding plyees...");
        let plyees = self.engine.find(ply_options, &tests).await?;
        self.output.debug_with("Plyees", &plyees);

        let sink = OutputSink::new(self.output.clone(), self.options.events);
        let results = self
            .engine
            .run(ply_options, &plyees, &self.options.run_options, &sink)
            .await?;
        let duration = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.output
            .event(RESULTS_EVENT_ID, &json!({ "results": results, "duration": duration }));
        self.output.info_with("\nOverall Results", &results);
        self.output.info(format!("Overall Duration: {duration} ms"));
        Ok(results)
    }

    /// Diagnostic only: failures are logged and the run goes on.
    async fn git_branch(&self) {
        match self.tools.git_branch().await {
            Ok(out) => {
                self.log_tool_output(&out);
                if !out.success() {
                    self.output.error(
                        AdapterError::Diagnostic(format!("exited with code {}", out.code)).to_string(),
                    );
                } else if !out.stdout.trim().is_empty() {
                    self.output.info(format!("git branch: {}", out.stdout.trim()));
                }
            }
            Err(err) => self
                .output
                .error(AdapterError::Diagnostic(format!("{err:#}")).to_string()),
        }
    }

    async fn npm_install(&self) -> Result<()> {
        let command = self.tools.npm_install_command();
        self.output.info(&command);
        let out = self
            .tools
            .npm_install()
            .await
            .map_err(|e| AdapterError::DependencyInstall(format!("{e:#}")))?;
        if !out.stdout.trim().is_empty() {
            self.output.info(out.stdout.trim_end());
        }
        self.log_tool_output(&out);
        if !out.success() {
            return Err(AdapterError::DependencyInstall(format!(
                "{command} exited with code {}: {}",
                out.code,
                out.stderr.trim()
            ))
            .into());
        }
        Ok(())
    }

    fn log_tool_output(&self, out: &ToolOutput) {
        if !out.stderr.trim().is_empty() {
            self.output.error(out.stderr.trim_end());
        }
    }
}

/// Maps the run's outcome onto the single terminal result record.
pub fn report(output: &Output, outcome: &Result<OverallResults>) -> ExecutionStatus {
    match outcome {
        Ok(results) => {
            let status = ExecutionStatus::from_results(results);
            match status {
                ExecutionStatus::Passed => output.result(status, "Passed", None),
                _ => output.result(status, "Failed", Some(&results.summary())),
            }
            status
        }
        Err(err) => {
            output.error_chain(err);
            let description = err.to_string();
            output.result(ExecutionStatus::Failed, &description, Some(&description));
            ExecutionStatus::Failed
        }
    }
}
