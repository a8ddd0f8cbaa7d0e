//! Aggregation of free-text run logs into structured records.
//!
//! Two line patterns are recognized, anything else is ignored:
//!
//! ```text
//! world_size=<int> bytes=<int> total_duration=<float>
//! xfer time (ms): <float>
//! ```
//!
//! A header line opens a record; transfer times that follow belong to it
//! until the next header or the end of the file.
use crate::{BenchError, Result};
use log::{debug, warn};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// One configuration extracted from a log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_payload: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trials: Option<u64>,
    pub world_size: usize,
    pub bytes: u64,
    /// Seconds.
    pub total_duration: f64,
    /// Milliseconds, in log order.
    pub xfer_times: Vec<f64>,
}

/// Run parameters attached to every record, when known.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunMetadata {
    pub total_payload: Option<u64>,
    pub warmup_steps: Option<u64>,
    pub trials: Option<u64>,
}

enum State {
    AwaitingHeader,
    Collecting(LogRecord),
}

pub struct LogAggregator {
    header: Regex,
    xfer: Regex,
    metadata: RunMetadata,
}

impl Default for LogAggregator {
    fn default() -> LogAggregator {
        LogAggregator::new()
    }
}

fn parse_field<T: FromStr>(caps: &Captures<'_>, index: usize, name: &str, line: usize) -> Result<T> {
    let raw = &caps[index];
    raw.parse().map_err(|_| BenchError::Parse {
        line,
        reason: format!("{} is not a valid number: {:?}", name, raw),
    })
}

fn parse_seconds(caps: &Captures<'_>, index: usize, name: &str, line: usize) -> Result<f64> {
    let value: f64 = parse_field(caps, index, name, line)?;
    if !value.is_finite() || value < 0.0 {
        return Err(BenchError::Parse {
            line,
            reason: format!("{} must be a non-negative number, got {}", name, value),
        });
    }
    Ok(value)
}

impl LogAggregator {
    pub fn new() -> LogAggregator {
        LogAggregator::with_metadata(RunMetadata::default())
    }

    pub fn with_metadata(metadata: RunMetadata) -> LogAggregator {
        LogAggregator {
            header: Regex::new(r"^world_size=(\S+)\s+bytes=(\S+)\s+total_duration=(\S+)")
                .expect("internal built-in regex must compile"),
            xfer: Regex::new(r"^xfer time \(ms\):\s*(\S+)")
                .expect("internal built-in regex must compile"),
            metadata,
        }
    }

    fn parse_header(&self, caps: &Captures<'_>, line: usize) -> Result<LogRecord> {
        Ok(LogRecord {
            total_payload: self.metadata.total_payload,
            warmup_steps: self.metadata.warmup_steps,
            trials: self.metadata.trials,
            world_size: parse_field(caps, 1, "world_size", line)?,
            bytes: parse_field(caps, 2, "bytes", line)?,
            total_duration: parse_seconds(caps, 3, "total_duration", line)?,
            xfer_times: vec![],
        })
    }

    /// Extract every record from the text of one log file.
    pub fn aggregate(&self, text: &str) -> Vec<LogRecord> {
        let mut records = vec![];
        let mut state = State::AwaitingHeader;

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            let line_no = i + 1;
            if let Some(caps) = self.header.captures(line) {
                // A header that doesn't parse is skipped, the open record stays open.
                match self.parse_header(&caps, line_no) {
                    Ok(record) => {
                        if let State::Collecting(done) = std::mem::replace(&mut state, State::Collecting(record)) {
                            records.push(done);
                        }
                    }
                    Err(err) => warn!("skipping malformed header: {}", err),
                }
            } else if let Some(caps) = self.xfer.captures(line) {
                if let State::Collecting(record) = &mut state {
                    match parse_seconds(&caps, 1, "xfer time", line_no) {
                        Ok(ms) => record.xfer_times.push(ms),
                        Err(err) => warn!("skipping malformed transfer time: {}", err),
                    }
                }
            }
        }

        if let State::Collecting(record) = state {
            records.push(record);
        }
        records
    }

    /// Extract records from every file under `root`, in sorted path order.
    pub fn aggregate_dir(&self, root: &Path) -> Result<Vec<LogRecord>> {
        let mut records = vec![];
        for path in log_files(root)? {
            match fs::read(&path) {
                Ok(bytes) => {
                    let found = self.aggregate(&String::from_utf8_lossy(&bytes));
                    debug!("{}: {} records", path.display(), found.len());
                    records.extend(found);
                }
                Err(err) => warn!("skipping unreadable log {}: {}", path.display(), err),
            }
        }
        Ok(records)
    }
}

/// Regular files under `root`, sorted by name at every level.
pub fn log_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("log directory {} does not exist", root.display()),
        )
        .into());
    }
    let mut files = vec![];
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => (),
            Err(err) => warn!("skipping entry under {}: {}", root.display(), err),
        }
    }
    Ok(files)
}

/// Write the records as one pretty-printed JSON array.
pub fn write_json<W: Write>(records: &[LogRecord], out: W) -> Result<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(out, formatter);
    records.serialize(&mut ser)?;
    Ok(())
}
