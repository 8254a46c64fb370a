//! Newline-delimited JSON detection feed.
//!
//! The detection collaborator writes one object per detected face:
//!
//! ```json
//! {"embedding": [0.01, ...], "bbox": [x1, y1, x2, y2], "frame": "/tmp/frame_0042.jpg"}
//! ```
//!
//! An optional `"timestamp": "YYYY-MM-DD HH:MM:SS"` overrides the arrival
//! time. Frames are read from disk, so the producer must keep each frame
//! file until the line has been consumed.

use crate::engine::{Detection, RecorderHandle};
use crate::notifier::{AlertSink, Notifier};
use argus_core::{record, BoundingBox, Embedding, Frame, RouteOutcome};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed detection line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp: {0:?}")]
    Timestamp(String),
    #[error("empty embedding")]
    EmptyEmbedding,
    #[error("failed to read frame {}: {source}", .path.display())]
    Frame {
        path: PathBuf,
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireDetection {
    pub embedding: Vec<f32>,
    pub bbox: [f32; 4],
    pub frame: PathBuf,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Parse one feed line. `now` is used when the line carries no timestamp.
pub fn parse_line(
    line: &str,
    now: NaiveDateTime,
) -> Result<(WireDetection, NaiveDateTime), IngestError> {
    let wire: WireDetection = serde_json::from_str(line)?;
    if wire.embedding.is_empty() {
        return Err(IngestError::EmptyEmbedding);
    }
    let timestamp = match &wire.timestamp {
        Some(raw) => {
            record::parse_timestamp(raw).ok_or_else(|| IngestError::Timestamp(raw.clone()))?
        }
        None => now,
    };
    Ok((wire, timestamp))
}

pub fn load_frame(path: &Path) -> Result<Frame, IngestError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| IngestError::Frame {
            path: path.to_path_buf(),
            source,
        })
}

/// Consume the feed until EOF.
///
/// Each line is processed to completion before the next is read. Errors are
/// logged and the loop moves on to the next line.
pub async fn run<R, S>(
    reader: R,
    recorder: RecorderHandle,
    notifier: Option<Notifier<S>>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    S: AlertSink,
{
    let mut lines = reader.lines();
    let mut processed = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ingest_line(line, &recorder).await {
            Ok(RouteOutcome::Known {
                name, target: true, ..
            }) => {
                if let Some(notifier) = &notifier {
                    notifier.notify(&name);
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "detection dropped"),
        }
        processed += 1;
    }

    tracing::info!(processed, "detection feed closed");
    Ok(())
}

async fn ingest_line(line: &str, recorder: &RecorderHandle) -> anyhow::Result<RouteOutcome> {
    let (wire, timestamp) = parse_line(line, chrono::Local::now().naive_local())?;

    let path = wire.frame.clone();
    let frame = tokio::task::spawn_blocking(move || load_frame(&path)).await??;

    let outcome = recorder
        .record(Detection {
            embedding: Embedding::new(wire.embedding),
            bbox: BoundingBox::from(wire.bbox),
            frame,
            timestamp,
        })
        .await?;
    Ok(outcome)
}
