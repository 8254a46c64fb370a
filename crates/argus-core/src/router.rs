//! Routes each detected face to the ledger or the unknown log.
//!
//! The router owns all persistent state for a process run and is driven by
//! a single caller: one detection is classified and fully recorded before
//! the next is considered.

use crate::gallery::{Gallery, Matcher, MetricMatcher};
use crate::ledger::{Ledger, LedgerError, LedgerUpdate};
use crate::snapshot::{SnapshotArchive, SnapshotError};
use crate::types::{BoundingBox, DetectionEvent, Embedding, Frame, Identity};
use crate::unknown_log::{UnknownLog, UnknownLogError, UnknownOutcome};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    UnknownLog(#[from] UnknownLogError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("embedding has {actual} dimensions, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Which identity classes get recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    KnownOnly,
    UnknownOnly,
    #[default]
    Both,
}

impl DetectionMode {
    pub fn accepts(&self, identity: &Identity) -> bool {
        match (self, identity) {
            (DetectionMode::Both, _) => true,
            (DetectionMode::KnownOnly, Identity::Known(_)) => true,
            (DetectionMode::UnknownOnly, Identity::Unknown) => true,
            _ => false,
        }
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "known" | "1" => Ok(DetectionMode::KnownOnly),
            "unknown" | "2" => Ok(DetectionMode::UnknownOnly),
            "both" | "3" => Ok(DetectionMode::Both),
            other => Err(format!("unknown detection mode: {other}")),
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionMode::KnownOnly => "known",
            DetectionMode::UnknownOnly => "unknown",
            DetectionMode::Both => "both",
        })
    }
}

/// Identity attributed to an embedding by the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub identity: Identity,
    /// Confidence in [0, 100].
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Filtered out by the detection mode.
    Skipped,
    Known {
        name: String,
        confidence: f32,
        update: LedgerUpdate,
        /// Whether `name` is a target of interest; its snapshot was refreshed.
        target: bool,
    },
    Unknown {
        confidence: f32,
        outcome: UnknownOutcome,
    },
}

pub struct DetectionRouter {
    gallery: Gallery,
    matcher: MetricMatcher,
    mode: DetectionMode,
    targets: BTreeSet<String>,
    ledger: Ledger,
    unknowns: UnknownLog,
    snapshots: SnapshotArchive,
}

impl DetectionRouter {
    pub fn new(
        gallery: Gallery,
        matcher: MetricMatcher,
        ledger: Ledger,
        unknowns: UnknownLog,
        snapshots: SnapshotArchive,
    ) -> Self {
        Self {
            gallery,
            matcher,
            mode: DetectionMode::default(),
            targets: BTreeSet::new(),
            ledger,
            unknowns,
            snapshots,
        }
    }

    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Names (upper-cased) whose detections refresh a "last seen" snapshot.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.targets = targets
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn unknown_log(&self) -> &UnknownLog {
        &self.unknowns
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn is_target(&self, name: &str) -> bool {
        self.targets.contains(name)
    }

    /// Attribute an embedding to a known identity or to "unknown".
    ///
    /// Unknown confidence is how far the face sits from its nearest known
    /// identity; with an empty gallery it is 0.
    pub fn classify(&self, embedding: &Embedding) -> Classification {
        let metric = self.matcher.metric;
        let result = self.matcher.compare(embedding, &self.gallery);
        match (result.name, result.score) {
            (Some(name), Some(score)) if result.matched => Classification {
                identity: Identity::Known(name),
                confidence: metric.confidence(score),
            },
            (_, score) => Classification {
                identity: Identity::Unknown,
                confidence: score.map_or(0.0, |s| 100.0 - metric.confidence(s)),
            },
        }
    }

    /// Classify a detected face and record it.
    ///
    /// Embeddings whose length differs from the gallery's are rejected
    /// before anything is written.
    pub fn route(
        &mut self,
        embedding: Embedding,
        bbox: BoundingBox,
        frame: &Frame,
        now: NaiveDateTime,
    ) -> Result<RouteOutcome, RouterError> {
        if let Some(expected) = self.gallery.dimension() {
            if embedding.len() != expected {
                return Err(RouterError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let Classification {
            identity,
            confidence,
        } = self.classify(&embedding);

        let event = DetectionEvent {
            identity,
            confidence,
            embedding,
            frame,
            bbox,
            timestamp: now,
        };
        self.record(&event)
    }

    /// Record an already-classified detection.
    pub fn record(&mut self, event: &DetectionEvent<'_>) -> Result<RouteOutcome, RouterError> {
        if !self.mode.accepts(&event.identity) {
            return Ok(RouteOutcome::Skipped);
        }

        match &event.identity {
            Identity::Known(name) => {
                let update =
                    self.ledger
                        .record_detection(name, event.confidence, event.timestamp)?;

                let target = self.is_target(name);
                if target {
                    let object_id = self.gallery.position(name).unwrap_or(0) as u64;
                    self.snapshots.save_snapshot(
                        name,
                        object_id,
                        event.frame,
                        &event.bbox,
                        event.timestamp,
                    )?;
                }

                Ok(RouteOutcome::Known {
                    name: name.clone(),
                    confidence: event.confidence,
                    update,
                    target,
                })
            }
            Identity::Unknown => {
                let outcome = self.unknowns.record_unknown(
                    event.frame,
                    &event.embedding,
                    event.confidence,
                    event.timestamp,
                )?;
                Ok(RouteOutcome::Unknown {
                    confidence: event.confidence,
                    outcome,
                })
            }
        }
    }

    /// Truncate the ledger to its header. The unknown log and cluster
    /// registry are left alone.
    pub fn clear_logs(&self) -> Result<(), RouterError> {
        Ok(self.ledger.clear()?)
    }
}
