use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use ply_testkube::{
    args::{merge, parse_args, PlyOptions},
    config::ProjectOptions,
    locator::{FileMatcher, GlobMatcher, TestLocator},
    output::{Output, OutputOptions},
    AdapterError,
};

/// Answers from a fixed table and records every pattern it was asked for.
#[derive(Default)]
struct TableMatcher {
    table: Vec<(String, Vec<String>)>,
    calls: Mutex<Vec<String>>,
}

impl TableMatcher {
    fn with(entries: &[(&str, &[&str])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(p, files)| (p.to_string(), files.iter().map(|f| f.to_string()).collect()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FileMatcher for TableMatcher {
    fn expand(&self, pattern: &str, _cwd: &Path, _ignore: &str) -> Result<Vec<String>, AdapterError> {
        self.calls.lock().unwrap().push(pattern.to_string());
        self.table
            .iter()
            .find(|(p, _)| p == pattern)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| AdapterError::Discovery {
                pattern: pattern.to_string(),
                reason: "no such pattern".into(),
            })
    }
}

fn options(args: &[&str]) -> Result<PlyOptions> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    Ok(merge(parse_args(&args)?, &ProjectOptions::default(), false)?
        .worker_options
        .ply_options)
}

fn quiet() -> Output {
    Output::memory(OutputOptions::default()).0
}

#[tokio::test]
async fn test_explicit_files_skip_discovery() -> Result<()> {
    let matcher = Arc::new(TableMatcher::default());
    let locator = TestLocator::new(quiet(), matcher.clone());
    let explicit = vec!["b.ply.flow".to_string(), "a.ply".to_string()];

    let found = locator.locate(&options(&[])?, Some(&explicit)).await?;
    assert_eq!(found, explicit);
    assert!(matcher.calls.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concatenates_categories_in_order() -> Result<()> {
    let matcher = Arc::new(TableMatcher::with(&[
        ("req", &["r2.ply", "r1.ply"][..]),
        ("flow", &["/abs/f.ply.flow"][..]),
        ("case", &["c.ply.ts"][..]),
    ]));
    let locator = TestLocator::new(quiet(), matcher.clone());
    let options = options(&[
        "testsLocation=tests",
        "requestFiles=req",
        "flowFiles=flow",
        "caseFiles=case",
    ])?;

    let found = locator.locate(&options, None).await?;
    assert_eq!(
        found,
        vec!["tests/r2.ply", "tests/r1.ply", "/abs/f.ply.flow", "tests/c.ply.ts"]
    );
    assert_eq!(matcher.calls.lock().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_one_failing_category_fails_discovery() -> Result<()> {
    let matcher = Arc::new(TableMatcher::with(&[("req", &["r.ply"][..]), ("case", &["c.ply.ts"][..])]));
    let locator = TestLocator::new(quiet(), matcher);
    let options = options(&["requestFiles=req", "flowFiles=flow", "caseFiles=case"])?;

    let err = locator.locate(&options, None).await.unwrap_err();
    match err.downcast_ref::<AdapterError>() {
        Some(AdapterError::Discovery { pattern, .. }) => assert_eq!(pattern, "flow"),
        other => panic!("expected discovery failure, got {other:?}"),
    }
    Ok(())
}

fn touch(root: &Path, rel: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "")?;
    Ok(())
}

#[test]
fn test_glob_matcher_honors_ignore() -> Result<()> {
    let dir = tempfile::tempdir()?;
    for rel in [
        "a.ply.yaml",
        "requests/b.ply",
        "requests/c.ply.yml",
        "node_modules/pkg/d.ply",
        "dist/e.ply.yaml",
        "notes.txt",
    ] {
        touch(dir.path(), rel)?;
    }

    let mut found = GlobMatcher.expand(
        "**/*.{ply,ply.yaml,ply.yml}",
        dir.path(),
        "**/{node_modules,bin,dist,out}/**",
    )?;
    found.sort();
    assert_eq!(found, vec!["a.ply.yaml", "requests/b.ply", "requests/c.ply.yml"]);
    Ok(())
}

#[test]
fn test_glob_matcher_without_ignore() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(dir.path(), "flows/x.ply.flow")?;
    touch(dir.path(), "out/y.ply.flow")?;

    let mut found = GlobMatcher.expand("**/*.ply.flow", dir.path(), "")?;
    found.sort();
    assert_eq!(found, vec!["flows/x.ply.flow", "out/y.ply.flow"]);
    Ok(())
}

#[test]
fn test_glob_matcher_brace_alternatives() -> Result<()> {
    let dir = tempfile::tempdir()?;
    for rel in ["a/x.c", "a/x.d", "b/x.c", "c/x.c", "single.ply"] {
        touch(dir.path(), rel)?;
    }

    let found = GlobMatcher.expand("{a,b}/x.{c,d}", dir.path(), "")?;
    assert_eq!(found, vec!["a/x.c", "a/x.d", "b/x.c"]);
    assert_eq!(GlobMatcher.expand("{single}.ply", dir.path(), "")?, vec!["single.ply"]);
    Ok(())
}

#[test]
fn test_glob_matcher_root_with_pattern_characters() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("suite[1]{a}");
    touch(&root, "flows/x.ply.flow")?;

    let found = GlobMatcher.expand("**/*.ply.flow", &root, "**/{node_modules,bin,dist,out}/**")?;
    assert_eq!(found, vec!["flows/x.ply.flow"]);
    Ok(())
}

#[test]
fn test_glob_matcher_missing_root_is_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let found = GlobMatcher.expand("**/*.ply", &dir.path().join("absent"), "")?;
    assert!(found.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_discovers_real_tree() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(dir.path(), "smoke.ply.flow")?;
    touch(dir.path(), "api/get.ply.yaml")?;
    touch(dir.path(), "cases/login.ply.ts")?;
    let root = dir.path().to_string_lossy().into_owned();

    let locator = TestLocator::new(quiet(), Arc::new(GlobMatcher));
    let found = locator
        .locate(&options(&[format!("testsLocation={root}").as_str()])?, None)
        .await?;
    assert_eq!(
        found,
        vec![
            format!("{root}/api/get.ply.yaml"),
            format!("{root}/smoke.ply.flow"),
            format!("{root}/cases/login.ply.ts"),
        ]
    );
    Ok(())
}
