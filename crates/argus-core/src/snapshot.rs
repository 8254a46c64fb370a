//! "Last seen" snapshot archive for named targets of interest.
//!
//! Layout: `<root>/<label>/last_seen.jpg` plus `<root>/<label>/meta.json`,
//! both overwritten on every save.

use crate::record;
use crate::types::{BoundingBox, Frame};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SNAPSHOT_FILE: &str = "last_seen.jpg";
const META_FILE: &str = "meta.json";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode snapshot image: {0}")]
    Image(#[from] image::ImageError),
    #[error("snapshot metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot label: {0:?}")]
    InvalidLabel(String),
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub object_id: u64,
    pub timestamp: String,
    pub bbox: [i32; 4],
}

pub struct SnapshotArchive {
    root: PathBuf,
}

impl SnapshotArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Overwrite the "last seen" frame and metadata for `label`.
    ///
    /// Returns the path of the written image.
    pub fn save_snapshot(
        &self,
        label: &str,
        object_id: u64,
        frame: &Frame,
        bbox: &BoundingBox,
        now: NaiveDateTime,
    ) -> Result<PathBuf, SnapshotError> {
        let dir = self.identity_dir(label)?;
        fs::create_dir_all(&dir)?;

        let image_path = dir.join(SNAPSHOT_FILE);
        frame.save(&image_path)?;

        let meta = SnapshotMeta {
            object_id,
            timestamp: record::format_timestamp(now),
            bbox: bbox.corners(),
        };
        fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;

        tracing::debug!(label, object_id, path = %image_path.display(), "snapshot saved");
        Ok(image_path)
    }

    /// Read back the metadata last written for `label`.
    pub fn load_meta(&self, label: &str) -> Result<SnapshotMeta, SnapshotError> {
        let text = fs::read_to_string(self.identity_dir(label)?.join(META_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn identity_dir(&self, label: &str) -> Result<PathBuf, SnapshotError> {
        let invalid = label.is_empty()
            || label == "."
            || label == ".."
            || label.contains(['/', '\\', '\0']);
        if invalid {
            return Err(SnapshotError::InvalidLabel(label.to_string()));
        }
        Ok(self.root.join(label))
    }
}
