//! Known-identity gallery and probe matching.
//!
//! The gallery holds one representative embedding per identity: the
//! L2-normalised mean of that identity's enrolment samples.

use crate::similarity::SimilarityMetric;
use crate::types::Embedding;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid gallery file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("embedding for {name} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// One enrolment sample as stored in the gallery file.
#[derive(Debug, Clone, Deserialize)]
pub struct GallerySample {
    pub name: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct KnownIdentity {
    pub name: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<KnownIdentity>,
    dimension: Option<usize>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from enrolment samples.
    ///
    /// Names are upper-cased; identities are ordered by name. Empty samples
    /// are skipped.
    pub fn from_samples(
        samples: impl IntoIterator<Item = GallerySample>,
    ) -> Result<Self, GalleryError> {
        let mut grouped: BTreeMap<String, Vec<Vec<f32>>> = BTreeMap::new();
        let mut dim: Option<usize> = None;

        for sample in samples {
            if sample.embedding.is_empty() {
                tracing::warn!(name = %sample.name, "empty gallery sample skipped");
                continue;
            }
            let expected = *dim.get_or_insert(sample.embedding.len());
            if sample.embedding.len() != expected {
                return Err(GalleryError::DimensionMismatch {
                    name: sample.name,
                    expected,
                    actual: sample.embedding.len(),
                });
            }
            grouped
                .entry(sample.name.to_uppercase())
                .or_default()
                .push(sample.embedding);
        }

        let identities = grouped
            .into_iter()
            .map(|(name, vectors)| KnownIdentity {
                name,
                embedding: mean(&vectors).l2_normalized(),
            })
            .collect();

        Ok(Self {
            identities,
            dimension: dim,
        })
    }

    /// Load a JSON array of `{"name", "embedding"}` samples.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let text = fs::read_to_string(path)?;
        let samples: Vec<GallerySample> = serde_json::from_str(&text)?;
        let gallery = Self::from_samples(samples)?;
        tracing::info!(
            path = %path.display(),
            identities = gallery.len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Embedding length shared by every identity; `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn identities(&self) -> &[KnownIdentity] {
        &self.identities
    }

    /// Index of the identity called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.identities.iter().position(|i| i.name == name)
    }
}

fn mean(vectors: &[Vec<f32>]) -> Embedding {
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len().max(1) as f32;
    Embedding::new(sum.into_iter().map(|x| x / n).collect())
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Raw metric score of the closest identity; `None` for an empty gallery.
    pub score: Option<f32>,
    /// Gallery index of the matched identity (if any).
    pub index: Option<usize>,
    /// Name of the matched identity (if any).
    pub name: Option<String>,
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// Nearest-identity matcher under a [`SimilarityMetric`].
///
/// Always scores every identity and keeps the best; the probe matches only
/// if that best score passes the metric's threshold.
#[derive(Debug, Clone, Copy)]
pub struct MetricMatcher {
    pub metric: SimilarityMetric,
}

impl MetricMatcher {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }
}

impl Matcher for MetricMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, identity) in gallery.identities.iter().enumerate() {
            let score = self.metric.score(probe, &identity.embedding);
            let is_better = match best {
                None => true,
                Some((_, best_score)) => self.metric.is_better(score, best_score),
            };
            if is_better {
                best = Some((i, score));
            }
        }

        match best {
            Some((idx, score)) if self.metric.passes(score) => MatchResult {
                matched: true,
                score: Some(score),
                index: Some(idx),
                name: Some(gallery.identities[idx].name.clone()),
            },
            _ => MatchResult {
                matched: false,
                score: best.map(|(_, score)| score),
                index: None,
                name: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str, embedding: &[f32]) -> GallerySample {
        GallerySample {
            name: name.into(),
            embedding: embedding.to_vec(),
        }
    }

    fn gallery() -> Gallery {
        Gallery::from_samples([
            sample("decoy1", &[0.0, 1.0, 0.0]),
            sample("decoy2", &[0.0, 0.0, 1.0]),
            sample("match", &[1.0, 0.0, 0.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_samples_grouped_averaged_and_normalized() {
        let gallery = Gallery::from_samples([
            sample("bob", &[2.0, 0.0]),
            sample("alice", &[1.0, 0.0]),
            sample("Bob", &[0.0, 2.0]),
        ])
        .unwrap();

        let names: Vec<_> = gallery.identities().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ALICE", "BOB"]);
        assert_eq!(gallery.dimension(), Some(2));

        let bob = &gallery.identities()[1].embedding.values;
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((bob[0] - expected).abs() < 1e-6);
        assert!((bob[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = Gallery::from_samples([sample("a", &[1.0, 0.0]), sample("b", &[1.0])]);
        assert!(matches!(
            err,
            Err(GalleryError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_cosine_matcher_scans_whole_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let result = MetricMatcher::new(SimilarityMetric::cosine(0.5)).compare(&probe, &gallery());

        assert!(result.matched);
        assert_eq!(result.name.as_deref(), Some("MATCH"));
        assert_eq!(result.index, gallery().position("MATCH"));
        assert!((result.score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_matcher_picks_lowest_distance() {
        let probe = Embedding::new(vec![0.1, 0.95, 0.0]);
        let result = MetricMatcher::new(SimilarityMetric::euclidean(0.5)).compare(&probe, &gallery());
        assert_eq!(result.name.as_deref(), Some("DECOY1"));
    }

    #[test]
    fn test_no_match_reports_best_score() {
        let probe = Embedding::new(vec![1.0, 1.0, 1.0]);
        let result = MetricMatcher::new(SimilarityMetric::cosine(0.9)).compare(&probe, &gallery());

        assert!(!result.matched);
        assert!(result.name.is_none());
        assert!((result.score.unwrap() - 1.0 / 3f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = MetricMatcher::new(SimilarityMetric::default()).compare(&probe, &Gallery::empty());
        assert!(!result.matched);
        assert_eq!(result.score, None);
        assert_eq!(Gallery::empty().dimension(), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(
            &path,
            r#"[{"name": "nishant", "embedding": [0.0, 3.0]}, {"name": "jasvant", "embedding": [4.0, 0.0]}]"#,
        )
        .unwrap();

        let gallery = Gallery::load(&path).unwrap();

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.position("NISHANT"), Some(1));
        assert_eq!(gallery.identities()[1].embedding.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Gallery::load(&path), Err(GalleryError::Json(_))));
    }
}
