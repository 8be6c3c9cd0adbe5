use std::{path::Path, process::ExitCode};

use clap::error::ErrorKind;
use ply_testkube::{
    cli::Cli,
    engine::ProcessEngine,
    execution::{Execution, ExecutionStatus},
    output::{Output, OutputOptions},
    runner, worker,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => Some(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(_) => None,
    };
    let request = cli
        .as_ref()
        .and_then(|c| c.execution.as_deref())
        .filter(|s| !s.trim().is_empty())
        .map(Execution::from_json);
    init_tracing(matches!(&request, Some(Ok(e)) if e.wants_debug()));

    let mut output = Output::stdout(OutputOptions::default());
    output.info(format!("ply-testkube version {}", env!("CARGO_PKG_VERSION")));

    // report every broken precondition before giving up
    let mut valid = true;
    if request.is_none() {
        output.error("Missing arguments");
        valid = false;
    }
    let data_dir = cli
        .as_ref()
        .and_then(|c| c.data_dir.clone())
        .filter(|dir| dir.is_dir());
    if data_dir.is_none() {
        output.error("Invalid or missing data directory");
        valid = false;
    }
    let execution = match request {
        Some(Ok(execution)) => Some(execution),
        Some(Err(err)) => {
            output.error(format!("Invalid execution request: {err}"));
            valid = false;
            None
        }
        None => None,
    };
    let (Some(execution), Some(data_dir), true) = (execution, data_dir, valid) else {
        return abort(&output);
    };

    if execution.wants_debug() {
        output = output.with_options(OutputOptions { debug: true, ..output.options() });
    }

    let repo = data_dir.join("repo");
    if let Err(err) = std::env::set_current_dir(&repo) {
        output.error(format!("Cannot enter {}: {}", repo.display(), err));
        return abort(&output);
    }
    if let (Some(id), name) = (&execution.id, &execution.name) {
        output.debug(format!("Execution {} {}", id, name.as_deref().unwrap_or_default()));
    }

    let ply_path = cli.and_then(|c| c.ply_path);
    let engine = match ProcessEngine::locate(ply_path.as_deref()) {
        Ok(engine) => engine,
        Err(err) => {
            worker::report(&output, &Err(err));
            return ExitCode::SUCCESS;
        }
    };
    tracing::debug!(program = %engine.program().display(), "using ply engine");

    runner::execute(&output, &execution, Path::new("."), engine).await;
    ExitCode::SUCCESS
}

fn abort(output: &Output) -> ExitCode {
    output.result(ExecutionStatus::Aborted, "Invalid context", None);
    ExitCode::from(1)
}

/// Diagnostics for the adapter itself go to stderr; stdout belongs to the host.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_env("PLY_TESTKUBE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if debug { "ply_testkube=debug" } else { "warn" })
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
