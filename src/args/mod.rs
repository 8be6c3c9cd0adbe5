//! Option resolution: host `key=value` flags, execution variables, project
//! config and engine defaults merged into the options the worker runs with.
//!
//! Precedence is per field: argument, then project config, then default.

use std::collections::BTreeMap;

use anyhow::Result;
use heck::ToLowerCamelCase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::{self, LocationDefaults, ProjectOptions},
    error::AdapterError,
    execution::{VariableType, Variables},
    output::Output,
};

/// Options parsed from the host's flat argument list, after key camel-casing
/// and value coercion. Keys we don't model land in `extra` as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npm_install: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_files: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Options handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlyOptions {
    pub tests_location: String,
    pub request_files: String,
    pub case_files: String,
    pub flow_files: String,
    pub ignore: String,
    pub skip: String,
    pub expected_location: String,
    pub actual_location: String,
    pub log_location: String,
    pub values_files: BTreeMap<String, bool>,
    pub verbose: bool,
    pub reporter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default)]
    pub trusted: bool,
    /// Runtime values; created on first variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunOptions {
    /// Shallow merge of the project's `runOptions` over `{trusted: true}`.
    pub fn from_project(project: Option<&Map<String, Value>>) -> Result<Self> {
        let mut merged = config::default_run_options();
        if let Some(project) = project {
            merged.extend(project.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    pub fn set_value(&mut self, name: &str, value: &str) {
        self.values
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), Value::String(value.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOptions {
    pub ply_options: PlyOptions,
    pub run_options: RunOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    pub npm_install: bool,
    pub events: bool,
}

/// Resolved arguments: worker options plus the explicit test file override.
#[derive(Debug, Clone, PartialEq)]
pub struct PlyArgs {
    pub test_files: Option<Vec<String>>,
    pub worker_options: WorkerOptions,
}

impl PlyArgs {
    pub fn resolve(
        output: &Output,
        args: &[String],
        vars: &Variables,
        project: &ProjectOptions,
    ) -> Result<Self> {
        output.debug_with("Ply arguments", args);
        output.debug_with("Variables", &redacted(vars));

        let parsed = parse_args(args)?;
        output.debug_with("Parsed options", &parsed);

        let mut resolved = merge(parsed, project, output.debug_enabled())?;
        for (name, var) in vars {
            if let Some(value) = var.value.as_deref().filter(|v| !v.is_empty()) {
                resolved.worker_options.run_options.set_value(name, value);
            }
        }

        output.debug_with("Worker options", &resolved.worker_options);
        Ok(resolved)
    }
}

/// Parses `key=value` tokens. The `=` must have text on both sides.
pub fn parse_args(args: &[String]) -> Result<ArgOptions, AdapterError> {
    let mut options = ArgOptions::default();
    for arg in args {
        let malformed = || AdapterError::MalformedArgument { arg: arg.clone() };
        let (key, value) = arg.split_once('=').ok_or_else(malformed)?;
        if key.is_empty() || value.is_empty() {
            return Err(malformed());
        }
        let name = camel_case(key);
        if name.is_empty() {
            return Err(malformed());
        }
        let value = value.replace("%20", " ");

        match name.as_str() {
            "verbose" => options.verbose = Some(value == "true"),
            "npmInstall" => options.npm_install = Some(value == "true"),
            "events" => options.events = Some(value == "true"),
            "delay" => {
                let ms = value.trim().parse::<u64>().map_err(|_| {
                    AdapterError::InvalidArgumentValue {
                        arg: arg.clone(),
                        reason: "delay must be a whole number of milliseconds".into(),
                    }
                })?;
                options.delay = Some(ms);
            }
            "testFiles" => options.test_files = Some(split_list(&value).collect()),
            "valuesFiles" => {
                options.values_files = Some(split_list(&value).map(|vf| (vf, true)).collect())
            }
            "testsLocation" => options.tests_location = Some(value),
            "requestFiles" => options.request_files = Some(value),
            "caseFiles" => options.case_files = Some(value),
            "flowFiles" => options.flow_files = Some(value),
            "ignore" => options.ignore = Some(value),
            "skip" => options.skip = Some(value),
            "expectedLocation" => options.expected_location = Some(value),
            "actualLocation" => options.actual_location = Some(value),
            "logLocation" => options.log_location = Some(value),
            "outputFile" => options.output_file = Some(value),
            "reporter" => options.reporter = Some(value),
            _ => {
                options.extra.insert(name, value);
            }
        }
    }
    Ok(options)
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').filter(|s| !s.is_empty()).map(str::to_string)
}

/// Host flags like `npm-install` or `tests_location` become `npmInstall`
/// and `testsLocation`. Already camel-cased keys pass through.
pub fn camel_case(key: &str) -> String {
    key.to_lower_camel_case()
}

/// Pure merge of parsed arguments over project options over defaults.
pub fn merge(args: ArgOptions, project: &ProjectOptions, debug: bool) -> Result<PlyArgs> {
    let p = project.clone();

    let tests_location = args
        .tests_location
        .or(p.tests_location)
        .unwrap_or_else(|| config::DEFAULT_TESTS_LOCATION.to_string());
    let fallback = LocationDefaults::new(&tests_location);

    let test_files = args.test_files.or(p.test_files);
    // explicit selection always wins over exclusion rules
    let skip = if test_files.is_some() {
        String::new()
    } else {
        args.skip.or(p.skip).unwrap_or_else(|| config::DEFAULT_SKIP.to_string())
    };

    let mut extra = p.extra;
    extra.extend(args.extra.into_iter().map(|(k, v)| (k, Value::String(v))));

    let ply_options = PlyOptions {
        request_files: args
            .request_files
            .or(p.request_files)
            .unwrap_or_else(|| config::DEFAULT_REQUEST_FILES.to_string()),
        case_files: args
            .case_files
            .or(p.case_files)
            .unwrap_or_else(|| config::DEFAULT_CASE_FILES.to_string()),
        flow_files: args
            .flow_files
            .or(p.flow_files)
            .unwrap_or_else(|| config::DEFAULT_FLOW_FILES.to_string()),
        ignore: args
            .ignore
            .or(p.ignore)
            .unwrap_or_else(|| config::DEFAULT_IGNORE.to_string()),
        skip,
        expected_location: args
            .expected_location
            .or(p.expected_location)
            .unwrap_or_else(|| fallback.expected_location()),
        actual_location: args
            .actual_location
            .or(p.actual_location)
            .unwrap_or_else(|| fallback.actual_location()),
        log_location: args
            .log_location
            .or(p.log_location)
            .unwrap_or_else(|| fallback.log_location()),
        values_files: args.values_files.or(p.values_files).unwrap_or_default(),
        verbose: args.verbose.or(p.verbose).unwrap_or(debug),
        reporter: args
            .reporter
            .or(p.reporter)
            .unwrap_or_else(|| config::DEFAULT_REPORTER.to_string()),
        output_file: args.output_file.or(p.output_file),
        tests_location,
        extra,
    };

    let worker_options = WorkerOptions {
        ply_options,
        run_options: RunOptions::from_project(p.run_options.as_ref())?,
        delay: args.delay.or(p.delay),
        npm_install: args.npm_install.or(p.npm_install).unwrap_or(false),
        events: args.events.or(p.events).unwrap_or(true),
    };

    Ok(PlyArgs { test_files, worker_options })
}

fn redacted(vars: &Variables) -> Variables {
    let mut vars = vars.clone();
    for var in vars.values_mut() {
        if var.kind == Some(VariableType::Secret) && var.value.is_some() {
            var.value = Some("********".into());
        }
    }
    vars
}
