use argus_core::{BoundingBox, DetectionRouter, Embedding, Frame, RouteOutcome, RouterError};
use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error("recorder thread exited")]
    ChannelClosed,
}

/// One detected face, ready to be routed.
pub struct Detection {
    pub embedding: Embedding,
    pub bbox: BoundingBox,
    pub frame: Frame,
    pub timestamp: NaiveDateTime,
}

/// Snapshot of recorder state for the control interface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub identities: usize,
    pub unknown_clusters: usize,
    pub mode: String,
    pub ledger_path: String,
    pub unknown_log_path: String,
}

/// Messages sent to the recorder thread.
enum RecorderRequest {
    Record {
        detection: Detection,
        reply: oneshot::Sender<Result<RouteOutcome, EngineError>>,
    },
    ClearLogs {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Clone-safe handle to the recorder thread.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderRequest>,
}

impl RecorderHandle {
    /// Route one detection and wait until it is fully recorded.
    pub async fn record(&self, detection: Detection) -> Result<RouteOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Record {
                detection,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Truncate the ledger to its header.
    pub async fn clear_logs(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::ClearLogs { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RecorderRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the recorder on a dedicated OS thread.
///
/// The thread is the only writer of the ledger, the unknown log and the
/// snapshot archive; requests are handled strictly one at a time.
pub fn spawn_recorder(mut router: DetectionRouter) -> std::io::Result<RecorderHandle> {
    let (tx, mut rx) = mpsc::channel::<RecorderRequest>(16);

    std::thread::Builder::new()
        .name("argus-recorder".into())
        .spawn(move || {
            tracing::info!("recorder thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    RecorderRequest::Record { detection, reply } => {
                        let result = router
                            .route(
                                detection.embedding,
                                detection.bbox,
                                &detection.frame,
                                detection.timestamp,
                            )
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    RecorderRequest::ClearLogs { reply } => {
                        let _ = reply.send(router.clear_logs().map_err(EngineError::from));
                    }
                    RecorderRequest::Status { reply } => {
                        let _ = reply.send(status_of(&router));
                    }
                }
            }
            tracing::info!("recorder thread exiting");
        })?;

    Ok(RecorderHandle { tx })
}

fn status_of(router: &DetectionRouter) -> StatusReport {
    StatusReport {
        identities: router.gallery().len(),
        unknown_clusters: router.unknown_log().registry().len(),
        mode: router.mode().to_string(),
        ledger_path: router.ledger().path().display().to_string(),
        unknown_log_path: router.unknown_log().log_path().display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::gallery::GallerySample;
    use argus_core::{
        Gallery, Ledger, LedgerPolicy, LedgerUpdate, MetricMatcher, SimilarityMetric,
        SnapshotArchive, UnknownLog, UnknownLogPolicy,
    };
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn router(dir: &TempDir) -> DetectionRouter {
        let gallery = Gallery::from_samples([GallerySample {
            name: "alice".into(),
            embedding: vec![1.0, 0.0],
        }])
        .unwrap();
        DetectionRouter::new(
            gallery,
            MetricMatcher::new(SimilarityMetric::cosine(0.4)),
            Ledger::new(dir.path().join("Attendance.csv"), LedgerPolicy::default()),
            UnknownLog::new(
                dir.path().join("UnknownLog.csv"),
                dir.path().join("UNKNOWN"),
                UnknownLogPolicy::default(),
            ),
            SnapshotArchive::new(dir.path().join("logs")),
        )
    }

    fn detection(values: Vec<f32>) -> Detection {
        Detection {
            embedding: Embedding::new(values),
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            frame: Frame::from_pixel(2, 2, image::Rgb([5, 5, 5])),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_record_clear_and_status() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_recorder(router(&dir)).unwrap();

        let outcome = handle.record(detection(vec![1.0, 0.0])).await.unwrap();
        assert!(matches!(
            outcome,
            RouteOutcome::Known { update: LedgerUpdate::Appended, .. }
        ));
        handle.record(detection(vec![0.0, 1.0])).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.identities, 1);
        assert_eq!(status.unknown_clusters, 1);
        assert_eq!(status.mode, "both");

        handle.clear_logs().await.unwrap();
        let text = std::fs::read_to_string(dir.path().join("Attendance.csv")).unwrap();
        assert_eq!(text, "Name,Timestamp,Confidence\n");
    }
}
