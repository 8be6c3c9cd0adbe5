//! Test discovery: explicit file list, or the three test categories expanded
//! under the tests root.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use futures::future::try_join_all;
use globset::{GlobBuilder, GlobMatcher as CompiledGlob};
use walkdir::WalkDir;

use crate::{args::PlyOptions, error::AdapterError, output::Output};

/// Pattern expansion collaborator. Returned paths are relative to `cwd`
/// unless the matcher produced absolute ones.
pub trait FileMatcher: Send + Sync {
    fn expand(&self, pattern: &str, cwd: &Path, ignore: &str) -> Result<Vec<String>, AdapterError>;
}

/// Filesystem matcher: walks `cwd` and matches each file's relative path,
/// so the root itself is never read as pattern syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

fn compile(pattern: &str) -> Result<CompiledGlob, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

impl FileMatcher for GlobMatcher {
    fn expand(&self, pattern: &str, cwd: &Path, ignore: &str) -> Result<Vec<String>, AdapterError> {
        let failure = |reason: String| AdapterError::Discovery {
            pattern: pattern.to_string(),
            reason,
        };
        let matcher = compile(pattern).map_err(|e| failure(e.to_string()))?;
        let ignore = match ignore {
            "" => None,
            ignore => Some(
                compile(ignore)
                    .map_err(|e| failure(format!("bad ignore pattern '{ignore}': {e}")))?,
            ),
        };
        if !cwd.is_dir() {
            return Ok(Vec::new());
        }
        let absolute = Path::new(pattern).is_absolute();

        let mut files = Vec::new();
        for entry in WalkDir::new(cwd).sort_by_file_name() {
            let entry = entry.map_err(|e| failure(e.to_string()))?;
            if !entry.path().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(cwd).unwrap_or(entry.path());
            if ignore.as_ref().is_some_and(|i| i.is_match(relative)) {
                continue;
            }
            let candidate: PathBuf = if absolute {
                entry.path().to_path_buf()
            } else {
                relative.to_path_buf()
            };
            if matcher.is_match(&candidate) {
                files.push(candidate.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(files)
    }
}

#[derive(Clone)]
pub struct TestLocator {
    output: Output,
    matcher: Arc<dyn FileMatcher>,
}

impl TestLocator {
    pub fn new(output: Output, matcher: Arc<dyn FileMatcher>) -> Self {
        Self { output, matcher }
    }

    /// The explicit list when given; otherwise request, flow and case files in
    /// that order, each in matcher order. Any failing category fails the lot.
    pub async fn locate(
        &self,
        options: &PlyOptions,
        test_files: Option<&[String]>,
    ) -> Result<Vec<String>> {
        if let Some(files) = test_files {
            return Ok(files.to_vec());
        }
        self.find_tests(options).await
    }

    pub async fn find_tests(&self, options: &PlyOptions) -> Result<Vec<String>> {
        let root = options.tests_location.clone();
        self.output.info(format!(
            "Finding ply tests under {}",
            std::path::absolute(&root)
                .unwrap_or_else(|_| PathBuf::from(&root))
                .display()
        ));

        let patterns = [
            options.request_files.clone(),
            options.flow_files.clone(),
            options.case_files.clone(),
        ];
        let lookups = patterns.into_iter().map(|pattern| {
            let matcher = Arc::clone(&self.matcher);
            let cwd = PathBuf::from(&root);
            let ignore = options.ignore.clone();
            async move {
                let found = tokio::task::spawn_blocking({
                    let pattern = pattern.clone();
                    move || matcher.expand(&pattern, &cwd, &ignore)
                })
                .await
                .map_err(|e| AdapterError::Discovery {
                    pattern,
                    reason: e.to_string(),
                })??;
                Ok::<_, AdapterError>(found)
            }
        });

        let found = try_join_all(lookups).await?;
        Ok(found
            .into_iter()
            .flatten()
            .map(|f| {
                if Path::new(&f).is_absolute() {
                    f
                } else {
                    format!("{root}/{f}")
                }
            })
            .collect())
    }
}
