//! Ties one host execution to a worker: resolve options, run, report.

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::{
    args::PlyArgs,
    config::{ProjectConfig, ProjectOptions},
    engine::Engine,
    execution::{Execution, ExecutionStatus, OverallResults},
    locator::FileMatcher,
    output::Output,
    process::Toolchain,
    worker::{report, PlyWorker},
};

pub struct PlyRunner<E> {
    args: PlyArgs,
    worker: PlyWorker<E>,
}

impl<E: Engine> PlyRunner<E> {
    pub fn new(
        output: &Output,
        execution: &Execution,
        project: &ProjectOptions,
        engine: E,
    ) -> Result<Self> {
        let args = PlyArgs::resolve(output, &execution.args, &execution.variables, project)?;
        let worker = PlyWorker::new(output.clone(), args.worker_options.clone(), engine);
        Ok(Self { args, worker })
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn FileMatcher>) -> Self {
        self.worker = self.worker.with_matcher(matcher);
        self
    }

    pub fn with_toolchain(mut self, tools: Toolchain) -> Self {
        self.worker = self.worker.with_toolchain(tools);
        self
    }

    pub fn args(&self) -> &PlyArgs {
        &self.args
    }

    pub async fn run_tests(&self) -> Result<OverallResults> {
        self.worker.run(self.args.test_files.as_deref()).await
    }
}

/// Runs `execution` against the project in `dir` and emits the terminal
/// result. Every failure on the way becomes a `failed` result.
pub async fn execute<E: Engine>(
    output: &Output,
    execution: &Execution,
    dir: &Path,
    engine: E,
) -> ExecutionStatus {
    let outcome = async {
        let project = ProjectConfig::load(dir)?;
        if let Some(path) = &project.path {
            output.debug(format!("Ply config: {}", path.display()));
        }
        let runner = PlyRunner::new(output, execution, &project.options, engine)?;
        runner.run_tests().await
    }
    .await;
    report(output, &outcome)
}
