//! Similarity metrics for comparing face embeddings.
//!
//! Embedding families disagree on convention: ArcFace-style models are
//! compared by cosine similarity (high = same person), dlib-style models by
//! Euclidean distance (low = same person). The metric and its threshold are
//! a property of the model in use, so both travel together here.

use crate::types::Embedding;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_COSINE_THRESHOLD: f32 = 0.40;
pub const DEFAULT_EUCLIDEAN_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityMetric {
    /// Similar iff cosine similarity >= `threshold`.
    Cosine { threshold: f32 },
    /// Similar iff Euclidean distance < `tolerance`.
    Euclidean { tolerance: f32 },
}

impl SimilarityMetric {
    pub fn cosine(threshold: f32) -> Self {
        Self::Cosine { threshold }
    }

    pub fn euclidean(tolerance: f32) -> Self {
        Self::Euclidean { tolerance }
    }

    /// Same metric family with a different threshold.
    pub fn with_threshold(self, threshold: f32) -> Self {
        match self {
            Self::Cosine { .. } => Self::Cosine { threshold },
            Self::Euclidean { .. } => Self::Euclidean {
                tolerance: threshold,
            },
        }
    }

    /// Raw score: cosine similarity or Euclidean distance.
    pub fn score(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            Self::Cosine { .. } => a.similarity(b),
            Self::Euclidean { .. } => a.euclidean_distance(b),
        }
    }

    /// Whether a raw score counts as "same person".
    pub fn passes(&self, score: f32) -> bool {
        match *self {
            Self::Cosine { threshold } => score >= threshold,
            Self::Euclidean { tolerance } => score < tolerance,
        }
    }

    pub fn is_similar(&self, a: &Embedding, b: &Embedding) -> bool {
        self.passes(self.score(a, b))
    }

    /// Whether `candidate` is a closer match than `incumbent`.
    pub fn is_better(&self, candidate: f32, incumbent: f32) -> bool {
        match self {
            Self::Cosine { .. } => candidate > incumbent,
            Self::Euclidean { .. } => candidate < incumbent,
        }
    }

    /// Map a raw score onto the [0, 100] confidence scale used by the logs.
    pub fn confidence(&self, score: f32) -> f32 {
        let unit = match self {
            Self::Cosine { .. } => score,
            Self::Euclidean { .. } => 1.0 - score,
        };
        (unit * 100.0).clamp(0.0, 100.0)
    }

    pub fn threshold(&self) -> f32 {
        match *self {
            Self::Cosine { threshold } => threshold,
            Self::Euclidean { tolerance } => tolerance,
        }
    }
}

impl Default for SimilarityMetric {
    fn default() -> Self {
        Self::cosine(DEFAULT_COSINE_THRESHOLD)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine { threshold } => write!(f, "cosine>={threshold}"),
            Self::Euclidean { tolerance } => write!(f, "euclidean<{tolerance}"),
        }
    }
}

/// Parses a metric family name into its default-threshold metric.
impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::cosine(DEFAULT_COSINE_THRESHOLD)),
            "euclidean" => Ok(Self::euclidean(DEFAULT_EUCLIDEAN_TOLERANCE)),
            other => Err(format!("unknown similarity metric: {other}")),
        }
    }
}
