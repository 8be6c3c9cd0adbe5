use std::fs;

use anyhow::Result;
use ply_testkube::config::{ProjectConfig, ProjectOptions};
use serde_json::json;

#[test]
fn test_no_config_yields_empty_options() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ProjectConfig::load(dir.path())?;
    assert_eq!(config.path, None);
    assert_eq!(config.options, ProjectOptions::default());
    Ok(())
}

#[test]
fn test_plyrc_json_wins_over_package_json() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".plyrc.json"),
        r#"{"testsLocation": "test", "valuesFiles": {"values.json": true}, "bail": true}"#,
    )?;
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "x", "plyconfig": {"testsLocation": "other"}}"#,
    )?;

    let config = ProjectConfig::load(dir.path())?;
    assert_eq!(config.path, Some(dir.path().join(".plyrc.json")));
    assert_eq!(config.options.tests_location.as_deref(), Some("test"));
    assert_eq!(
        config.options.values_files.unwrap_or_default().get("values.json"),
        Some(&true)
    );
    assert_eq!(config.options.extra.get("bail"), Some(&json!(true)));
    Ok(())
}

#[test]
fn test_falls_back_to_package_json_section() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "x", "plyconfig": {"testsLocation": "test", "runOptions": {"trusted": false}}}"#,
    )?;

    let config = ProjectConfig::load(dir.path())?;
    assert_eq!(config.options.tests_location.as_deref(), Some("test"));
    assert_eq!(
        config.options.run_options.and_then(|r| r.get("trusted").cloned()),
        Some(json!(false))
    );
    Ok(())
}

#[test]
fn test_package_json_without_section_is_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("package.json"), r#"{"name": "x"}"#)?;
    assert_eq!(ProjectConfig::load(dir.path())?.path, None);
    Ok(())
}

#[test]
fn test_broken_config_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(".plyrc"), "{ not json")?;
    let err = ProjectConfig::load(dir.path()).unwrap_err();
    assert!(err.to_string().starts_with("parsing ply config"));
    Ok(())
}
