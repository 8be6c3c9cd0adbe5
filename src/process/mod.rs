//! External tool invocation: the git branch diagnostic and npm install.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result};
use tokio::process::Command;

pub const GIT_BRANCH_ARGS: &[&str] = &["branch", "--show-current"];
pub const NPM_INSTALL_ARGS: &[&str] = &["install", "--omit=dev", "--omit=optional"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `program` to completion. Only a spawn failure is an error; the exit
/// status is left to the caller so captured output is never lost.
pub async fn exec_file(program: &Path, args: &[&str]) -> Result<ToolOutput> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to spawn {}", program.display()))?;

    Ok(ToolOutput {
        code: out.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

/// Programs used for the optional pre-run steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub git: PathBuf,
    pub npm: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self { git: PathBuf::from("git"), npm: PathBuf::from("npm") }
    }
}

impl Toolchain {
    pub async fn git_branch(&self) -> Result<ToolOutput> {
        exec_file(&self.git, GIT_BRANCH_ARGS).await
    }

    pub async fn npm_install(&self) -> Result<ToolOutput> {
        exec_file(&self.npm, NPM_INSTALL_ARGS).await
    }

    pub fn npm_install_command(&self) -> String {
        format!("{} {}", self.npm.display(), NPM_INSTALL_ARGS.join(" "))
    }
}
