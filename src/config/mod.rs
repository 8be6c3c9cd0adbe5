//! Project configuration discovered on disk, and the engine defaults it is
//! layered over.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Searched in order in the working directory; first hit wins.
pub const CONFIG_FILES: &[&str] = &[".plyrc.json", ".plyrc"];
/// Fallback: this key of `package.json`.
pub const PACKAGE_JSON_KEY: &str = "plyconfig";

pub const DEFAULT_TESTS_LOCATION: &str = ".";
pub const DEFAULT_REQUEST_FILES: &str = "**/*.{ply,ply.yaml,ply.yml}";
pub const DEFAULT_CASE_FILES: &str = "**/*.ply.ts";
pub const DEFAULT_FLOW_FILES: &str = "**/*.ply.flow";
pub const DEFAULT_IGNORE: &str = "**/{node_modules,bin,dist,out}/**";
pub const DEFAULT_SKIP: &str = "**/*.ply";
pub const DEFAULT_REPORTER: &str = "json";

/// Options as they appear in a project config file. Everything is optional;
/// unknown keys are kept and handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOptions {
    pub tests_location: Option<String>,
    pub request_files: Option<String>,
    pub case_files: Option<String>,
    pub flow_files: Option<String>,
    pub ignore: Option<String>,
    pub skip: Option<String>,
    pub expected_location: Option<String>,
    pub actual_location: Option<String>,
    pub log_location: Option<String>,
    pub output_file: Option<String>,
    pub reporter: Option<String>,
    pub values_files: Option<BTreeMap<String, bool>>,
    pub verbose: Option<bool>,
    pub test_files: Option<Vec<String>>,
    pub delay: Option<u64>,
    pub npm_install: Option<bool>,
    pub events: Option<bool>,
    pub run_options: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub options: ProjectOptions,
    /// Where the options came from; `None` when no config was found.
    pub path: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn load(dir: &Path) -> Result<Self> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.is_file() {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading ply config: {}", path.display()))?;
                let options = serde_json::from_str(&text)
                    .with_context(|| format!("parsing ply config: {}", path.display()))?;
                return Ok(Self { options, path: Some(path) });
            }
        }

        let package = dir.join("package.json");
        if package.is_file() {
            let text = fs::read_to_string(&package)
                .with_context(|| format!("reading {}", package.display()))?;
            let value: Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", package.display()))?;
            if let Some(section) = value.get(PACKAGE_JSON_KEY) {
                let options = serde_json::from_value(section.clone()).with_context(|| {
                    format!("parsing '{}' in {}", PACKAGE_JSON_KEY, package.display())
                })?;
                return Ok(Self { options, path: Some(package) });
            }
        }

        Ok(Self::default())
    }
}

/// Output locations derived from a tests root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDefaults {
    tests_location: String,
}

impl LocationDefaults {
    pub fn new(tests_location: &str) -> Self {
        Self { tests_location: tests_location.to_string() }
    }

    pub fn expected_location(&self) -> String {
        format!("{}/results/expected", self.tests_location)
    }

    pub fn actual_location(&self) -> String {
        format!("{}/results/actual", self.tests_location)
    }

    pub fn log_location(&self) -> String {
        self.actual_location()
    }
}

pub fn default_run_options() -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("trusted".into(), Value::Bool(true));
    m
}
