//! `arbiter replay` command implementation.
//!
//! Feeds a JSON Lines file of decisions through a `DecisionLogger` backed by
//! the in-process consensus log, optionally attaches outcomes, shuts the
//! logger down (flushing everything) and prints the final metrics.
//!
//! Outcome lines reference a decision either by its zero-based position in
//! the input or by id:
//!
//! ```text
//! {"decision_index": 0, "result": {"success": true}}
//! {"decision_id": "9f2c4e1a7b3d5f60", "result": {"success": false}}
//! ```

use anyhow::{Context, Result, bail};
use arbiter_core::ArbiterConfig;
use arbiter_log::{DecisionLogger, LoggerError, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::check;

#[derive(Debug, Deserialize)]
struct OutcomeLine {
    #[serde(default)]
    decision_index: Option<usize>,
    #[serde(default)]
    decision_id: Option<String>,
    result: serde_json::Value,
}

/// Summary printed at the end of a replay.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub accepted: usize,
    pub rejected: usize,
    pub outcomes_attached: usize,
    pub outcomes_ignored: usize,
    pub remote_messages: usize,
    pub metrics: MetricsSnapshot,
}

pub async fn run(config_path: &Path, input: &Path, outcomes: Option<&Path>) -> Result<()> {
    let config = check::load(config_path)?;
    let report = replay(config, input, outcomes).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Replay `input` (and `outcomes`) through a fresh logger.
pub async fn replay(
    config: ArbiterConfig,
    input: &Path,
    outcomes: Option<&Path>,
) -> Result<ReplayReport> {
    let decisions = fs::read_to_string(input)
        .with_context(|| format!("failed to read decisions from {}", input.display()))?;
    let outcome_lines = match outcomes {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read outcomes from {}", path.display()))?,
        ),
        None => None,
    };

    let (logger, log) = DecisionLogger::in_memory(&config.consensus);
    logger
        .initialize(config.logger.clone())
        .await
        .context("failed to initialize decision logger")?;

    let ids = match ingest(&logger, &decisions) {
        Ok(ids) => ids,
        Err(e) => {
            logger.shutdown().await;
            return Err(e);
        }
    };
    let accepted = ids.iter().filter(|id| id.is_some()).count();
    let rejected = ids.len() - accepted;

    let (outcomes_attached, outcomes_ignored) = match &outcome_lines {
        Some(content) => attach_outcomes(&logger, &ids, content),
        None => (0, 0),
    };

    logger.shutdown().await;

    let report = ReplayReport {
        accepted,
        rejected,
        outcomes_attached,
        outcomes_ignored,
        remote_messages: log.len(),
        metrics: logger.get_metrics(),
    };
    tracing::info!(
        accepted = report.accepted,
        rejected = report.rejected,
        remote_messages = report.remote_messages,
        "Replay finished"
    );
    Ok(report)
}

/// Log every non-blank line. Returns one slot per line, `None` if rejected.
fn ingest(logger: &DecisionLogger, content: &str) -> Result<Vec<Option<String>>> {
    let mut ids = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed decision line");
                ids.push(None);
                continue;
            }
        };
        match logger.log_decision_value(value) {
            Ok(id) => ids.push(Some(id)),
            Err(LoggerError::InvalidDecision(reason)) => {
                tracing::warn!(line = line_no + 1, %reason, "Skipping invalid decision");
                ids.push(None);
            }
            Err(e) => bail!("failed to log decision on line {}: {e}", line_no + 1),
        }
    }
    Ok(ids)
}

/// Attach outcome lines. Returns (attached, ignored).
fn attach_outcomes(
    logger: &DecisionLogger,
    ids: &[Option<String>],
    content: &str,
) -> (usize, usize) {
    let mut attached = 0;
    let mut ignored = 0;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let outcome: OutcomeLine = match serde_json::from_str(line) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed outcome line");
                ignored += 1;
                continue;
            }
        };

        let decision_id = outcome.decision_id.or_else(|| {
            outcome
                .decision_index
                .and_then(|index| ids.get(index).cloned().flatten())
        });
        let known = decision_id
            .as_deref()
            .is_some_and(|id| logger.log_decision_outcome(id, outcome.result));
        if known {
            attached += 1;
        } else {
            tracing::warn!(line = line_no + 1, "Outcome references no logged decision");
            ignored += 1;
        }
    }
    (attached, ignored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::LoggerConfig;
    use arbiter_log::{LedgerEntry, read_entries};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_replay_logs_and_attaches_outcomes() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");
        let input = dir.path().join("decisions.jsonl");
        let outcomes = dir.path().join("outcomes.jsonl");

        fs::write(
            &input,
            concat!(
                "{\"type\":\"STRATEGY_CHANGE\",\"strategy\":\"momentum\",\"confidence\":0.85}\n",
                "{\"strategy\":\"no type\"}\n",
                "\n",
                "{\"type\":\"ARBITRAGE_ACTION\",\"reasoning\":\"spread 42bps\"}\n",
            ),
        )
        .unwrap();
        fs::write(
            &outcomes,
            concat!(
                "{\"decision_index\":2,\"result\":{\"success\":true}}\n",
                "{\"decision_index\":1,\"result\":{\"success\":true}}\n",
                "{\"decision_id\":\"nonexistent-id\",\"result\":{}}\n",
            ),
        )
        .unwrap();

        let config = ArbiterConfig {
            logger: LoggerConfig {
                local_log_path: logs.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = replay(config, &input, Some(&outcomes)).await.unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.outcomes_attached, 1);
        assert_eq!(report.outcomes_ignored, 2);
        assert_eq!(report.remote_messages, 2);
        assert_eq!(report.metrics.successful_logs, 2);
        assert_eq!(report.metrics.rejected_decisions, 1);
        assert_eq!(report.metrics.queue_size, 0);

        let scan = read_entries(&logs).unwrap();
        let outcomes = scan
            .entries
            .iter()
            .filter(|entry| matches!(entry, LedgerEntry::Outcome(_)))
            .count();
        assert_eq!(scan.entries.len(), 3);
        assert_eq!(outcomes, 1);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let dir = tempdir().unwrap();
        let result = replay(
            ArbiterConfig::default(),
            &dir.path().join("missing.jsonl"),
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
