//! Known-identity ledger.
//!
//! One evolving row per named identity per dedup window. Bursts of repeated
//! detections of the same person collapse into that row: a better-confidence
//! observation overwrites its timestamp and confidence, anything else is
//! absorbed. Once the window has passed, the next detection opens a new row.
//!
//! Every update is a whole-file read followed by a full rewrite. This is
//! only safe with a single writer process; concurrent writers can lose
//! updates between the read and the rename.

use crate::record;
use chrono::{NaiveDateTime, TimeDelta};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TIME_GAP_SECS: i64 = 60;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 50.0;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    /// Repeated detections of one name closer together than this are one event.
    pub time_gap: TimeDelta,
    /// Detections below this confidence are dropped.
    pub confidence_floor: f32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            time_gap: TimeDelta::seconds(DEFAULT_TIME_GAP_SECS),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// A well-formed ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub name: String,
    pub last_timestamp: NaiveDateTime,
    pub last_confidence: f32,
}

impl LedgerRow {
    fn from_record(fields: &[String]) -> Option<Self> {
        let [name, timestamp, confidence, ..] = fields else {
            return None;
        };
        Some(Self {
            name: name.clone(),
            last_timestamp: record::parse_timestamp(timestamp)?,
            last_confidence: record::parse_confidence(confidence)?,
        })
    }
}

/// What a call to [`Ledger::record_detection`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// Confidence under the floor; the file was not touched.
    BelowFloor,
    /// No recent row for the name; a new one was appended.
    Appended,
    /// A recent row existed and this observation replaced its timestamp and confidence.
    Improved,
    /// A recent row existed with equal or better confidence; left unchanged.
    Absorbed,
}

pub struct Ledger {
    path: PathBuf,
    policy: LedgerPolicy,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>, policy: LedgerPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Record a detection of `name` at `now`.
    ///
    /// Rows whose timestamp does not parse are kept verbatim and never count
    /// as a recent match.
    pub fn record_detection(
        &self,
        name: &str,
        confidence: f32,
        now: NaiveDateTime,
    ) -> Result<LedgerUpdate, LedgerError> {
        if confidence.is_nan() || confidence < self.policy.confidence_floor {
            tracing::debug!(name, confidence, "below confidence floor; dropped");
            return Ok(LedgerUpdate::BelowFloor);
        }

        let mut records = self.load()?;
        let mut found_recent = false;
        let mut improved = false;

        for fields in records.iter_mut() {
            if fields.first().map(String::as_str) != Some(name) {
                continue;
            }
            let Some(stored_at) = fields.get(1).and_then(|s| record::parse_timestamp(s)) else {
                tracing::debug!(name, row = ?fields, "unparsable ledger timestamp; row kept");
                continue;
            };
            if now - stored_at >= self.policy.time_gap {
                continue;
            }

            found_recent = true;
            let stored_confidence = fields.get(2).and_then(|s| record::parse_confidence(s));
            if matches!(stored_confidence, Some(stored) if confidence > stored) {
                fields[1] = record::format_timestamp(now);
                fields[2] = record::format_confidence(confidence);
                improved = true;
            }
        }

        let update = if !found_recent {
            records.push(record::entry(name, now, confidence));
            LedgerUpdate::Appended
        } else if improved {
            LedgerUpdate::Improved
        } else {
            LedgerUpdate::Absorbed
        };

        self.store(&records)?;

        match update {
            LedgerUpdate::Appended => tracing::info!(name, confidence, "ledger row appended"),
            LedgerUpdate::Improved => tracing::info!(name, confidence, "ledger row improved"),
            _ => tracing::debug!(name, confidence, "detection absorbed into recent row"),
        }

        Ok(update)
    }

    /// All well-formed rows, in file order.
    pub fn rows(&self) -> Result<Vec<LedgerRow>, LedgerError> {
        read_rows(&self.path)
    }

    /// Truncate the ledger to its header row.
    pub fn clear(&self) -> Result<(), LedgerError> {
        self.store(&[])?;
        tracing::info!(path = %self.path.display(), "ledger cleared");
        Ok(())
    }

    /// Data records (header excluded). A missing file has none.
    fn load(&self) -> Result<Vec<Vec<String>>, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(record::parse_records(&text).into_iter().skip(1).collect())
    }

    /// Rewrite header plus `records` via a sibling temp file and rename.
    fn store(&self, records: &[Vec<String>]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut out = record::encode_line(&record::HEADER);
        out.push('\n');
        for fields in records {
            out.push_str(&record::encode_line(fields.as_slice()));
            out.push('\n');
        }

        let tmp = temp_path(&self.path);
        fs::write(&tmp, out)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Read well-formed `Name,Timestamp,Confidence` rows from a log file,
/// skipping the header and anything that does not parse.
pub fn read_rows(path: &Path) -> Result<Vec<LedgerRow>, LedgerError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(record::parse_records(&text)
        .iter()
        .skip(1)
        .filter_map(|fields| LedgerRow::from_record(fields))
        .collect())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(".tmp");
    path.with_file_name(name)
}
