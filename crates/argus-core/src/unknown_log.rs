//! Unknown-face log: cooldown-gated, append-only.
//!
//! Every unknown detection is clustered against the run's
//! [`ClusterRegistry`]. Only a genuinely new face, or a known cluster seen
//! again after its cooldown, produces a `UNKNOWN` row in the log file and a
//! timestamped frame under the snapshot directory.

use crate::cluster::{ClusterRegistry, Sighting};
use crate::ledger::{self, LedgerError, LedgerRow};
use crate::record;
use crate::similarity::SimilarityMetric;
use crate::types::{Embedding, Frame};
use chrono::{NaiveDateTime, TimeDelta};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const UNKNOWN_LABEL: &str = "UNKNOWN";
pub const DEFAULT_UNKNOWN_GAP_SECS: i64 = 10;

#[derive(Error, Debug)]
pub enum UnknownLogError {
    #[error("unknown log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write unknown snapshot: {0}")]
    Image(#[from] image::ImageError),
    #[error("embedding has {actual} dimensions, registry expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<LedgerError> for UnknownLogError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Io(e) => UnknownLogError::Io(e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnknownLogPolicy {
    /// Minimum time between two log rows for the same cluster.
    pub cooldown: TimeDelta,
    /// Decides whether two unknown embeddings are the same person.
    pub metric: SimilarityMetric,
}

impl Default for UnknownLogPolicy {
    fn default() -> Self {
        Self {
            cooldown: TimeDelta::seconds(DEFAULT_UNKNOWN_GAP_SECS),
            metric: SimilarityMetric::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownOutcome {
    /// Same face already logged within the cooldown; nothing written.
    Suppressed { cluster: usize },
    /// A row was appended and the frame archived at `snapshot`.
    Logged {
        cluster: usize,
        new_cluster: bool,
        snapshot: PathBuf,
    },
}

pub struct UnknownLog {
    log_path: PathBuf,
    snapshot_dir: PathBuf,
    policy: UnknownLogPolicy,
    registry: ClusterRegistry,
}

impl UnknownLog {
    /// Log with an empty registry.
    pub fn new(
        log_path: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
        policy: UnknownLogPolicy,
    ) -> Self {
        Self::with_registry(log_path, snapshot_dir, policy, ClusterRegistry::new())
    }

    pub fn with_registry(
        log_path: impl Into<PathBuf>,
        snapshot_dir: impl Into<PathBuf>,
        policy: UnknownLogPolicy,
        registry: ClusterRegistry,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            snapshot_dir: snapshot_dir.into(),
            policy,
            registry,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Cluster an unknown detection and log it unless its cluster is cooling down.
    ///
    /// The snapshot is named after `now` to the second. When that name is
    /// already taken, as with two strangers in one frame, a `_1`, `_2`, ...
    /// suffix keeps every logged event's frame.
    pub fn record_unknown(
        &mut self,
        frame: &Frame,
        embedding: &Embedding,
        confidence: f32,
        now: NaiveDateTime,
    ) -> Result<UnknownOutcome, UnknownLogError> {
        if let Some(expected) = self.registry.dimension() {
            if embedding.len() != expected {
                return Err(UnknownLogError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let sighting =
            self.registry
                .observe(embedding, now, &self.policy.metric, self.policy.cooldown);

        if !sighting.should_log() {
            tracing::debug!(cluster = sighting.cluster(), "unknown face in cooldown; suppressed");
            return Ok(UnknownOutcome::Suppressed {
                cluster: sighting.cluster(),
            });
        }

        self.append_row(confidence, now)?;

        fs::create_dir_all(&self.snapshot_dir)?;
        let snapshot = self.snapshot_path(now);
        frame.save(&snapshot)?;

        let new_cluster = matches!(sighting, Sighting::New { .. });
        tracing::info!(
            cluster = sighting.cluster(),
            new_cluster,
            confidence,
            snapshot = %snapshot.display(),
            "unknown face logged"
        );

        Ok(UnknownOutcome::Logged {
            cluster: sighting.cluster(),
            new_cluster,
            snapshot,
        })
    }

    /// All well-formed rows in the log file.
    pub fn rows(&self) -> Result<Vec<LedgerRow>, UnknownLogError> {
        Ok(ledger::read_rows(&self.log_path)?)
    }

    fn snapshot_path(&self, now: NaiveDateTime) -> PathBuf {
        let stem = format!("unknown_{}", now.format("%Y%m%d_%H%M%S"));
        let mut path = self.snapshot_dir.join(format!("{stem}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = self.snapshot_dir.join(format!("{stem}_{n}.jpg"));
            n += 1;
        }
        path
    }

    fn append_row(&self, confidence: f32, now: NaiveDateTime) -> Result<(), UnknownLogError> {
        if let Some(parent) = self.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", record::encode_line(&record::HEADER))?;
        }
        writeln!(
            file,
            "{}",
            record::encode_line(record::entry(UNKNOWN_LABEL, now, confidence).as_slice())
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(s: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(22, 15, 0)
            .unwrap()
            + TimeDelta::seconds(s)
    }

    fn frame() -> Frame {
        Frame::from_pixel(4, 4, image::Rgb([90, 90, 90]))
    }

    fn unknown_log(dir: &TempDir) -> UnknownLog {
        UnknownLog::new(
            dir.path().join("assets/UnknownLog.csv"),
            dir.path().join("logs/UNKNOWN"),
            UnknownLogPolicy {
                cooldown: TimeDelta::seconds(10),
                metric: SimilarityMetric::cosine(0.4),
            },
        )
    }

    fn snapshot_count(log: &UnknownLog) -> usize {
        fs::read_dir(log.snapshot_dir()).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_first_unknown_logged_with_header() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);

        let outcome = log
            .record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 63.456, at(0))
            .unwrap();

        let snapshot = dir.path().join("logs/UNKNOWN/unknown_20240501_221500.jpg");
        assert_eq!(
            outcome,
            UnknownOutcome::Logged {
                cluster: 0,
                new_cluster: true,
                snapshot: snapshot.clone(),
            }
        );
        assert!(snapshot.exists());
        assert_eq!(
            fs::read_to_string(log.log_path()).unwrap(),
            "Name,Timestamp,Confidence\nUNKNOWN,2024-05-01 22:15:00,63.46\n"
        );
    }

    #[test]
    fn test_cooldown_suppresses_row_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);
        let face = Embedding::new(vec![1.0, 0.0]);
        let same_face = Embedding::new(vec![0.99, 0.02]);

        log.record_unknown(&frame(), &face, 60.0, at(0)).unwrap();
        let outcome = log.record_unknown(&frame(), &same_face, 60.0, at(4)).unwrap();

        assert_eq!(outcome, UnknownOutcome::Suppressed { cluster: 0 });
        assert_eq!(log.rows().unwrap().len(), 1);
        assert_eq!(snapshot_count(&log), 1);
    }

    #[test]
    fn test_beyond_cooldown_logs_again() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);
        let face = Embedding::new(vec![1.0, 0.0]);

        log.record_unknown(&frame(), &face, 60.0, at(0)).unwrap();
        let outcome = log.record_unknown(&frame(), &face, 61.0, at(11)).unwrap();

        assert!(matches!(
            outcome,
            UnknownOutcome::Logged { cluster: 0, new_cluster: false, .. }
        ));
        let rows = log.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.name == UNKNOWN_LABEL));
        assert_eq!(snapshot_count(&log), 2);
        assert_eq!(log.registry().len(), 1);
    }

    #[test]
    fn test_new_face_logged_regardless_of_cooldown() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);

        log.record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 60.0, at(0))
            .unwrap();
        let outcome = log
            .record_unknown(&frame(), &Embedding::new(vec![0.0, 1.0]), 60.0, at(1))
            .unwrap();

        assert!(matches!(
            outcome,
            UnknownOutcome::Logged { cluster: 1, new_cluster: true, .. }
        ));
        assert_eq!(log.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_two_strangers_in_one_second_keep_both_snapshots() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);

        let first = log
            .record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 60.0, at(0))
            .unwrap();
        let second = log
            .record_unknown(&frame(), &Embedding::new(vec![0.0, 1.0]), 60.0, at(0))
            .unwrap();

        let (UnknownOutcome::Logged { snapshot: a, .. }, UnknownOutcome::Logged { snapshot: b, .. }) =
            (first, second)
        else {
            panic!("both faces should be logged");
        };
        assert_eq!(a, dir.path().join("logs/UNKNOWN/unknown_20240501_221500.jpg"));
        assert_eq!(b, dir.path().join("logs/UNKNOWN/unknown_20240501_221500_1.jpg"));
        assert_eq!(log.rows().unwrap().len(), 2);
        assert_eq!(snapshot_count(&log), 2);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let dir = TempDir::new().unwrap();
        let mut log = unknown_log(&dir);
        log.record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 60.0, at(0))
            .unwrap();

        let err = log
            .record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0, 0.0]), 60.0, at(30))
            .unwrap_err();

        assert!(matches!(
            err,
            UnknownLogError::DimensionMismatch { expected: 2, actual: 3 }
        ));
        assert_eq!(log.rows().unwrap().len(), 1);
        assert_eq!(log.registry().len(), 1);
        assert_eq!(snapshot_count(&log), 1);
    }

    #[test]
    fn test_appends_to_existing_log_without_second_header() {
        let dir = TempDir::new().unwrap();
        let mut first_run = unknown_log(&dir);
        first_run
            .record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 60.0, at(0))
            .unwrap();

        // New process run: empty registry, same files.
        let mut second_run = unknown_log(&dir);
        second_run
            .record_unknown(&frame(), &Embedding::new(vec![1.0, 0.0]), 60.0, at(2))
            .unwrap();

        let text = fs::read_to_string(second_run.log_path()).unwrap();
        assert_eq!(text.matches("Name,Timestamp,Confidence").count(), 1);
        assert_eq!(second_run.rows().unwrap().len(), 2);
    }
}
