//! In-memory registry of unknown faces seen during this run.
//!
//! Each entry stands for one inferred unknown person, represented by the
//! first embedding seen for them. New sightings are matched against entries
//! in insertion order and the first similar entry wins, even when a later
//! entry would be closer. The registry starts empty on every process start.

use crate::similarity::SimilarityMetric;
use crate::types::Embedding;
use chrono::{NaiveDateTime, TimeDelta};

#[derive(Debug, Clone)]
pub struct ClusterEntry {
    /// First-seen embedding; never updated by later sightings.
    pub embedding: Embedding,
    pub last_logged: NaiveDateTime,
}

/// Outcome of matching one unknown embedding against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// No entry matched; a new one was inserted at index `cluster`.
    New { cluster: usize },
    /// Matched an entry whose cooldown had elapsed; its log time was refreshed.
    Reappeared { cluster: usize },
    /// Matched an entry logged less than a cooldown ago.
    Suppressed { cluster: usize },
}

impl Sighting {
    pub fn cluster(&self) -> usize {
        match *self {
            Sighting::New { cluster }
            | Sighting::Reappeared { cluster }
            | Sighting::Suppressed { cluster } => cluster,
        }
    }

    pub fn should_log(&self) -> bool {
        !matches!(self, Sighting::Suppressed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    entries: Vec<ClusterEntry>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }

    /// Embedding length fixed by the first entry; `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }

    /// Match `embedding` against known clusters and update the registry.
    pub fn observe(
        &mut self,
        embedding: &Embedding,
        now: NaiveDateTime,
        metric: &SimilarityMetric,
        cooldown: TimeDelta,
    ) -> Sighting {
        let matched = self
            .entries
            .iter()
            .position(|entry| metric.is_similar(&entry.embedding, embedding));

        match matched {
            Some(cluster) => {
                let entry = &mut self.entries[cluster];
                if now - entry.last_logged < cooldown {
                    Sighting::Suppressed { cluster }
                } else {
                    entry.last_logged = now;
                    Sighting::Reappeared { cluster }
                }
            }
            None => {
                self.entries.push(ClusterEntry {
                    embedding: embedding.clone(),
                    last_logged: now,
                });
                Sighting::New {
                    cluster: self.entries.len() - 1,
                }
            }
        }
    }
}
