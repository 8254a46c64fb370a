use crate::engine::RecorderHandle;
use zbus::interface;

pub const BUS_NAME: &str = "org.argus.Argus1";
pub const OBJECT_PATH: &str = "/org/argus/Argus1";

/// D-Bus control interface for the Argus daemon.
///
/// Bus name: org.argus.Argus1
/// Object path: /org/argus/Argus1
pub struct ArgusService {
    pub recorder: RecorderHandle,
}

#[interface(name = "org.argus.Argus1")]
impl ArgusService {
    /// Truncate the known-identity ledger to its header row.
    async fn clear_logs(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("clear_logs requested");
        self.recorder
            .clear_logs()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(true)
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self
            .recorder
            .status()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": report.identities,
            "unknown_clusters": report.unknown_clusters,
            "mode": report.mode,
            "ledger": report.ledger_path,
            "unknown_log": report.unknown_log_path,
        })
        .to_string())
    }
}
