//! Local append-only log.
//!
//! Decisions and outcomes are appended as JSON Lines to daily segments under a
//! configured directory:
//!
//! - `decisions-2026-01-31.jsonl` - first segment of the day
//! - `decisions-2026-01-31.1.jsonl` - next segment once the size limit is hit
//!
//! Every line is a tagged [`LedgerEntry`], so segments can be read back with
//! standard tools (jq, grep) or with [`read_entries`].

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{LoggerError, SinkError};
use crate::record::LedgerEntry;

const SEGMENT_PREFIX: &str = "decisions-";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// Trait for local append-only sinks.
#[async_trait]
pub trait LocalSink: Send + Sync {
    /// Append one entry. Either the whole line is written or nothing is.
    async fn append(&self, entry: &LedgerEntry) -> Result<(), SinkError>;
}

/// Segmented JSON Lines file sink.
pub struct FileSink {
    directory: PathBuf,
    max_segment_bytes: u64,
    segment: Mutex<SegmentState>,
}

#[derive(Debug, Default)]
struct SegmentState {
    day: Option<NaiveDate>,
    index: u32,
}

impl FileSink {
    /// Create a sink writing under `directory`. A `max_segment_bytes` of 0
    /// keeps one segment per day regardless of size.
    pub fn new(directory: impl AsRef<Path>, max_segment_bytes: u64) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            max_segment_bytes,
            segment: Mutex::new(SegmentState::default()),
        }
    }

    /// Pick the segment the next `incoming` bytes go to.
    async fn segment_path(
        &self,
        state: &mut SegmentState,
        incoming: u64,
    ) -> std::io::Result<PathBuf> {
        let today = Utc::now().date_naive();
        if state.day != Some(today) {
            state.day = Some(today);
            state.index = 0;
        }

        loop {
            let path = self.directory.join(segment_name(today, state.index));
            if self.max_segment_bytes == 0 {
                return Ok(path);
            }
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > 0 && meta.len() + incoming > self.max_segment_bytes => {
                    state.index += 1;
                }
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(path),
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LocalSink for FileSink {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), SinkError> {
        let line = entry.to_line()?;

        // Held across the write so concurrent appends never interleave.
        let mut state = self.segment.lock().await;

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.segment_path(&mut state, line.len() as u64).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let before = file.metadata().await?.len();

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            if let Err(truncate_err) = file.set_len(before).await {
                tracing::error!(
                    path = %path.display(),
                    error = %truncate_err,
                    "Failed to roll back partial local log line"
                );
            }
            return Err(e.into());
        }

        Ok(())
    }
}

fn segment_name(day: NaiveDate, index: u32) -> String {
    if index == 0 {
        format!("{SEGMENT_PREFIX}{}{SEGMENT_SUFFIX}", day.format("%Y-%m-%d"))
    } else {
        format!(
            "{SEGMENT_PREFIX}{}.{index}{SEGMENT_SUFFIX}",
            day.format("%Y-%m-%d")
        )
    }
}

/// Parse a segment file name into its sort key `(day, index)`.
fn parse_segment_name(name: &str) -> Option<(NaiveDate, u32)> {
    let stem = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    let (day, index) = match stem.split_once('.') {
        Some((day, index)) => (day, index.parse().ok()?),
        None => (stem, 0),
    };
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some((day, index))
}

/// Entries read back from a local log directory.
#[derive(Debug, Default)]
pub struct LedgerScan {
    /// Entries in write order.
    pub entries: Vec<LedgerEntry>,
    /// Segment files read.
    pub segments: Vec<PathBuf>,
    /// Lines that could not be parsed.
    pub malformed: usize,
}

/// Read every segment under `directory`, oldest first.
///
/// A missing directory yields an empty scan.
pub fn read_entries(directory: impl AsRef<Path>) -> Result<LedgerScan, LoggerError> {
    let directory = directory.as_ref();
    let mut scan = LedgerScan::default();
    if !directory.exists() {
        return Ok(scan);
    }

    let mut segments = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_segment_name);
        if let Some(key) = key {
            segments.push((key, path));
        }
    }
    segments.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, path) in segments {
        let reader = BufReader::new(fs::File::open(&path)?);
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) => scan.entries.push(entry),
                Err(e) => {
                    scan.malformed += 1;
                    tracing::warn!(
                        "Failed to parse ledger entry on line {} of {}: {}",
                        line_num + 1,
                        path.display(),
                        e
                    );
                }
            }
        }
        scan.segments.push(path);
    }

    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Decision, DecisionRecord, OutcomeRecord, RecordClock};
    use serde_json::json;

    fn entry(clock: &RecordClock, decision_type: &str) -> LedgerEntry {
        let record = DecisionRecord::create(Decision::new(decision_type), clock, None).unwrap();
        LedgerEntry::Decision(record)
    }

    #[tokio::test]
    async fn test_append_creates_directory_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested/logs");
        let sink = FileSink::new(&log_dir, 0);
        let clock = RecordClock::new();

        sink.append(&entry(&clock, "STRATEGY_CHANGE")).await.unwrap();
        sink.append(&LedgerEntry::Outcome(OutcomeRecord::new("abc", json!({"success": true}))))
            .await
            .unwrap();

        let scan = read_entries(&log_dir).unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.segments.len(), 1);
        assert_eq!(scan.malformed, 0);
        assert!(matches!(scan.entries[0], LedgerEntry::Decision(_)));
        assert!(matches!(scan.entries[1], LedgerEntry::Outcome(_)));
    }

    #[tokio::test]
    async fn test_segments_roll_over_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path(), 64);
        let clock = RecordClock::new();

        for _ in 0..3 {
            sink.append(&entry(&clock, "RISK_ASSESSMENT")).await.unwrap();
        }

        let scan = read_entries(dir.path()).unwrap();
        assert_eq!(scan.entries.len(), 3);
        assert_eq!(scan.segments.len(), 3);

        let ids: Vec<u64> = scan
            .entries
            .iter()
            .map(|e| match e {
                LedgerEntry::Decision(r) => r.sequence,
                LedgerEntry::Outcome(_) => 0,
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unwritable_directory_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let sink = FileSink::new(&blocker, 0);
        let clock = RecordClock::new();
        let result = sink.append(&entry(&clock, "STRATEGY_CHANGE")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("decisions-2026-01-02.jsonl"),
            "{\"kind\":\"outcome\",\"decision_id\":\"a\",\"result\":1,\"recorded_at\":\"2026-01-02T00:00:00Z\"}\nnot json\n\n",
        )
        .unwrap();
        fs::write(dir.path().join("unrelated.txt"), "ignored").unwrap();

        let scan = read_entries(dir.path()).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.malformed, 1);
        assert_eq!(scan.segments.len(), 1);
    }

    #[test]
    fn test_segment_name_ordering() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(segment_name(day, 0), "decisions-2026-01-31.jsonl");
        assert_eq!(segment_name(day, 2), "decisions-2026-01-31.2.jsonl");
        assert_eq!(
            parse_segment_name("decisions-2026-01-31.10.jsonl"),
            Some((day, 10))
        );
        assert_eq!(parse_segment_name("decisions-2026-01-31.jsonl"), Some((day, 0)));
        assert_eq!(parse_segment_name("audit.log"), None);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scan = read_entries(dir.path().join("absent")).unwrap();
        assert!(scan.entries.is_empty());
    }
}
