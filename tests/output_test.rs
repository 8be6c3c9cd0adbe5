use std::{sync::Arc, thread};

use anyhow::{anyhow, Context, Result};
use ply_testkube::{
    execution::ExecutionStatus,
    output::{Output, OutputOptions, OutputRecord},
};
use serde_json::{json, Value};

fn debug_options() -> OutputOptions {
    OutputOptions { debug: true, ..Default::default() }
}

fn lines(text: &str) -> Result<Vec<Value>> {
    text.lines()
        .map(|l| serde_json::from_str(l).map_err(Into::into))
        .collect()
}

#[test]
fn test_log_and_error_records() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    output.info("hello");
    output.error("boom");

    let lines = lines(&memory.contents())?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "log");
    assert_eq!(lines[0]["content"], "hello");
    assert!(lines[0]["time"].is_string());
    assert_eq!(lines[1]["type"], "error");
    assert_eq!(lines[1]["content"], "boom");
    Ok(())
}

#[test]
fn test_debug_is_suppressed_unless_enabled() -> Result<()> {
    let (quiet, quiet_memory) = Output::memory(OutputOptions::default());
    quiet.debug("hidden");
    quiet.debug_with("hidden", &json!({"a": 1}));
    assert!(quiet_memory.contents().is_empty());

    let (loud, loud_memory) = Output::memory(debug_options());
    loud.debug("shown");
    let records = loud_memory.records()?;
    assert!(matches!(&records[..], [OutputRecord::Log { content, .. }] if content == "shown"));
    Ok(())
}

#[test]
fn test_disabled_output_writes_nothing() {
    let (output, memory) = Output::memory(OutputOptions { enabled: false, debug: true, indent: 2 });
    output.info("a");
    output.error("b");
    output.debug("c");
    output.event("ply.PlyEvent", &json!({}));
    output.result(ExecutionStatus::Passed, "Passed", None);
    assert!(memory.contents().is_empty());
}

#[test]
fn test_trace_is_written_as_second_record() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    output.error_trace("request failed", "Error: request failed\n    at step 1");

    let records = memory.records()?;
    assert_eq!(records.len(), 2);
    assert!(matches!(&records[0], OutputRecord::Error { content, .. } if content == "request failed"));
    assert!(matches!(&records[1], OutputRecord::Error { content, .. } if content.contains("at step 1")));
    Ok(())
}

#[test]
fn test_error_chain_carries_causes() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    let err = Err::<(), _>(anyhow!("disk full")).context("writing results").unwrap_err();
    output.error_chain(&err);

    let records = memory.records()?;
    assert_eq!(records.len(), 2);
    assert!(matches!(&records[0], OutputRecord::Error { content, .. } if content == "writing results"));
    assert!(matches!(&records[1], OutputRecord::Error { content, .. } if content.contains("disk full")));
    Ok(())
}

#[test]
fn test_object_is_merged_into_message() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    output.info_with("Overall Results", &json!({"Passed": 1}));

    let records = memory.records()?;
    match &records[..] {
        [OutputRecord::Log { content, .. }] => {
            assert_eq!(content, "Overall Results: {\n  \"Passed\": 1\n}");
        }
        other => panic!("unexpected records: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_indent_is_configurable() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions { indent: 4, ..Default::default() });
    output.info_with("x", &json!({"a": 1}));
    assert_eq!(lines(&memory.contents())?[0]["content"], "x: {\n    \"a\": 1\n}");
    Ok(())
}

#[test]
fn test_event_content_is_encoded_json() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    let payload = json!({"plyee": "a.ply.flow#s1", "status": "Passed"});
    output.event("ply.OutcomeEvent", &payload);

    let records = memory.records()?;
    let OutputRecord::Event { content, .. } = &records[0] else {
        panic!("expected event, got {records:?}");
    };
    let decoded: Value = serde_json::from_str(content)?;
    assert_eq!(decoded, json!({"id": "ply.OutcomeEvent", "event": payload}));
    Ok(())
}

#[test]
fn test_error_message_only_on_failure() -> Result<()> {
    let (passed, passed_memory) = Output::memory(OutputOptions::default());
    passed.result(ExecutionStatus::Passed, "Passed", Some("ignored"));
    let line = &lines(&passed_memory.contents())?[0];
    assert_eq!(line["type"], "result");
    assert_eq!(line["result"]["status"], "passed");
    assert_eq!(line["result"]["output"], "Passed");
    assert!(line["result"].get("errorMessage").is_none());
    assert!(line["result"]["time"].is_string());

    let (failed, failed_memory) = Output::memory(OutputOptions::default());
    failed.result(ExecutionStatus::Failed, "Failed", None);
    let line = &lines(&failed_memory.contents())?[0];
    assert_eq!(line["result"]["status"], "failed");
    assert_eq!(line["result"]["errorMessage"], "Failed");

    let (aborted, aborted_memory) = Output::memory(OutputOptions::default());
    aborted.result(ExecutionStatus::Aborted, "Invalid context", None);
    let line = &lines(&aborted_memory.contents())?[0];
    assert_eq!(line["result"]["status"], "aborted");
    assert!(line["result"].get("errorMessage").is_none());
    Ok(())
}

#[test]
fn test_result_is_written_once_across_clones() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    let debug = output.with_options(debug_options());
    output.result(ExecutionStatus::Failed, "first", None);
    debug.result(ExecutionStatus::Passed, "second", None);

    let results: Vec<_> = memory
        .records()?
        .into_iter()
        .filter(|r| matches!(r, OutputRecord::Result { .. }))
        .collect();
    assert_eq!(results.len(), 1);
    assert!(output.result_emitted());
    assert!(matches!(&results[0], OutputRecord::Result { result } if result.output == "first"));
    Ok(())
}

#[test]
fn test_records_round_trip() -> Result<()> {
    let (output, memory) = Output::memory(debug_options());
    output.debug("d");
    output.error("e");
    output.event("flowbee.FlowEvent", &json!({"elementType": "step"}));
    output.result(ExecutionStatus::Failed, "Failed", Some("1 failed"));

    let records = memory.records()?;
    let reencoded = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(reencoded.join("\n"), memory.contents().trim_end());
    Ok(())
}

#[test]
fn test_concurrent_writers_never_interleave() -> Result<()> {
    let (output, memory) = Output::memory(OutputOptions::default());
    let output = Arc::new(output);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let output = Arc::clone(&output);
            thread::spawn(move || {
                for i in 0..50 {
                    output.event("ply.PlyEvent", &json!({"thread": t, "i": i, "pad": "x".repeat(200)}));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| anyhow!("writer thread panicked"))?;
    }

    let records = memory.records()?;
    assert_eq!(records.len(), 400);
    Ok(())
}
