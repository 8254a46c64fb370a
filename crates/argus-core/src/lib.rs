//! argus-core: detection event deduplication and logging.
//!
//! Turns a per-frame stream of face detections into a de-duplicated ledger
//! of known identities, a cooldown-gated log of unknown faces, and a
//! snapshot archive.

pub mod cluster;
pub mod gallery;
pub mod ledger;
pub mod record;
pub mod router;
pub mod similarity;
pub mod snapshot;
pub mod types;
pub mod unknown_log;

pub use gallery::{Gallery, Matcher, MetricMatcher};
pub use ledger::{Ledger, LedgerPolicy, LedgerRow, LedgerUpdate};
pub use router::{DetectionMode, DetectionRouter, RouteOutcome, RouterError};
pub use similarity::SimilarityMetric;
pub use snapshot::SnapshotArchive;
pub use types::{BoundingBox, DetectionEvent, Embedding, Frame, Identity};
pub use unknown_log::{UnknownLog, UnknownLogPolicy, UnknownOutcome};
