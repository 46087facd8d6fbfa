//! `arbiter inspect` command implementation.
//!
//! Reads every segment of a local decision log and prints per-type counts.

use anyhow::{Context, Result};
use arbiter_log::{LedgerEntry, read_entries};
use std::collections::BTreeMap;
use std::path::Path;

/// Counts gathered from a local log directory.
#[derive(Debug, Default, PartialEq)]
pub struct LogSummary {
    pub segments: usize,
    pub decisions: usize,
    pub outcomes: usize,
    pub malformed: usize,
    pub by_type: BTreeMap<String, usize>,
}

pub fn summarize(dir: &Path) -> Result<LogSummary> {
    let scan = read_entries(dir)
        .with_context(|| format!("failed to read local log at {}", dir.display()))?;

    let mut summary = LogSummary {
        segments: scan.segments.len(),
        malformed: scan.malformed,
        ..Default::default()
    };
    for entry in &scan.entries {
        match entry {
            LedgerEntry::Decision(record) => {
                summary.decisions += 1;
                *summary
                    .by_type
                    .entry(record.decision_type.clone())
                    .or_default() += 1;
            }
            LedgerEntry::Outcome(_) => summary.outcomes += 1,
        }
    }
    Ok(summary)
}

pub fn run(dir: &Path) -> Result<()> {
    let summary = summarize(dir)?;

    println!("Local decision log: {}", dir.display());
    println!("  Segments:  {}", summary.segments);
    println!("  Decisions: {}", summary.decisions);
    for (decision_type, count) in &summary.by_type {
        println!("    {decision_type:<24} {count}");
    }
    println!("  Outcomes:  {}", summary.outcomes);
    if summary.malformed > 0 {
        println!("  ⚠️  Malformed lines: {}", summary.malformed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let summary = summarize(&dir.path().join("nope")).unwrap();
        assert_eq!(summary, LogSummary::default());
    }

    #[test]
    fn test_counts_types_outcomes_and_malformed() {
        let dir = tempdir().unwrap();
        let lines = [
            r#"{"kind":"decision","id":"a1","type":"STRATEGY_CHANGE","confidence":0.9,"reasoning":"","created_at":"2026-01-05T10:00:00Z","sequence":1,"status":"QUEUED"}"#,
            r#"{"kind":"decision","id":"a2","type":"STRATEGY_CHANGE","confidence":0.4,"reasoning":"","created_at":"2026-01-05T10:00:01Z","sequence":2,"status":"QUEUED"}"#,
            r#"{"kind":"decision","id":"a3","type":"RISK_ASSESSMENT","confidence":0.7,"reasoning":"","created_at":"2026-01-05T10:00:02Z","sequence":3,"status":"QUEUED"}"#,
            r#"{"kind":"outcome","decision_id":"a1","result":{"success":true},"recorded_at":"2026-01-05T10:05:00Z"}"#,
            "not json",
        ];
        fs::write(
            dir.path().join("decisions-2026-01-05.jsonl"),
            lines.join("\n") + "\n",
        )
        .unwrap();

        let summary = summarize(dir.path()).unwrap();
        assert_eq!(summary.segments, 1);
        assert_eq!(summary.decisions, 3);
        assert_eq!(summary.outcomes, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.by_type["STRATEGY_CHANGE"], 2);
        assert_eq!(summary.by_type["RISK_ASSESSMENT"], 1);
    }
}
