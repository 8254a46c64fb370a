use argus_core::ledger::{DEFAULT_CONFIDENCE_FLOOR, DEFAULT_TIME_GAP_SECS};
use argus_core::unknown_log::DEFAULT_UNKNOWN_GAP_SECS;
use argus_core::{DetectionMode, SimilarityMetric};
use chrono::TimeDelta;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Known-identity ledger file.
    pub ledger_path: PathBuf,
    /// Append-only unknown-face log file.
    pub unknown_log_path: PathBuf,
    /// Root of the per-identity "last seen" snapshot folders.
    pub snapshot_dir: PathBuf,
    /// Flat directory for timestamped unknown-face frames.
    pub unknown_dir: PathBuf,
    /// JSON gallery of enrolled identity samples.
    pub gallery_path: PathBuf,
    /// Dedup window for known identities.
    pub time_gap: TimeDelta,
    /// Cooldown between log rows for one unknown cluster.
    pub unknown_gap: TimeDelta,
    /// Known detections below this confidence are not recorded.
    pub confidence_floor: f32,
    /// Metric and threshold for matching probes against the gallery.
    pub match_metric: SimilarityMetric,
    /// Metric and threshold for clustering unknown faces.
    pub cluster_metric: SimilarityMetric,
    pub detection_mode: DetectionMode,
    /// Upper-cased names that trigger snapshots and notifications.
    pub targets: Vec<String>,
    /// Telegram bot credentials; notifications are disabled without both.
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Minimum seconds between two notifications for one identity.
    pub notify_cooldown_secs: u64,
    /// Timeout in seconds for a single notification request.
    pub notify_timeout_secs: u64,
    /// Whether to serve the control interface on the session bus.
    pub dbus_enabled: bool,
}

impl Config {
    /// Load configuration from `ARGUS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ARGUS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let snapshot_dir = env_path("ARGUS_SNAPSHOT_DIR", || data_dir.join("logs"));
        let unknown_dir = env_path("ARGUS_UNKNOWN_DIR", || snapshot_dir.join("UNKNOWN"));

        let metric: SimilarityMetric = std::env::var("ARGUS_METRIC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let match_metric = metric.with_threshold(env_f32("ARGUS_MATCH_THRESHOLD", metric.threshold()));
        let cluster_metric =
            metric.with_threshold(env_f32("ARGUS_CLUSTER_THRESHOLD", match_metric.threshold()));

        Self {
            ledger_path: env_path("ARGUS_LEDGER_PATH", || data_dir.join("assets/Attendance.csv")),
            unknown_log_path: env_path("ARGUS_UNKNOWN_LOG_PATH", || {
                data_dir.join("assets/UnknownLog.csv")
            }),
            gallery_path: env_path("ARGUS_GALLERY_PATH", || {
                data_dir.join("encodings/gallery.json")
            }),
            snapshot_dir,
            unknown_dir,
            time_gap: env_secs_delta("ARGUS_TIME_GAP_SECS", DEFAULT_TIME_GAP_SECS),
            unknown_gap: env_secs_delta("ARGUS_UNKNOWN_GAP_SECS", DEFAULT_UNKNOWN_GAP_SECS),
            confidence_floor: env_f32("ARGUS_CONFIDENCE_FLOOR", DEFAULT_CONFIDENCE_FLOOR),
            match_metric,
            cluster_metric,
            detection_mode: std::env::var("ARGUS_DETECTION_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            targets: std::env::var("ARGUS_TARGETS")
                .map(|v| parse_targets(&v))
                .unwrap_or_default(),
            telegram_token: env_nonempty("ARGUS_TELEGRAM_TOKEN"),
            telegram_chat_id: env_nonempty("ARGUS_TELEGRAM_CHAT_ID"),
            notify_cooldown_secs: env_u64("ARGUS_NOTIFY_COOLDOWN_SECS", 5),
            notify_timeout_secs: env_u64("ARGUS_NOTIFY_TIMEOUT_SECS", 3),
            dbus_enabled: std::env::var("ARGUS_DBUS_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }
}

/// Split a comma-separated target list into trimmed, upper-cased names.
pub fn parse_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn env_path(key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs_delta(key: &str, default_secs: i64) -> TimeDelta {
    secs_delta(key, env_i64(key, default_secs), default_secs)
}

/// Seconds as a `TimeDelta`, falling back to `default_secs` when out of range.
fn secs_delta(key: &str, secs: i64, default_secs: i64) -> TimeDelta {
    TimeDelta::try_seconds(secs).unwrap_or_else(|| {
        tracing::warn!(key, secs, default_secs, "duration out of range; using default");
        TimeDelta::seconds(default_secs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            parse_targets(" nishant, Jasvant ,,"),
            vec!["NISHANT".to_string(), "JASVANT".to_string()]
        );
        assert!(parse_targets("").is_empty());
    }

    #[test]
    fn test_secs_delta_out_of_range_falls_back() {
        assert_eq!(secs_delta("GAP", 90, 60), TimeDelta::seconds(90));
        assert_eq!(secs_delta("GAP", i64::MAX, 60), TimeDelta::seconds(60));
        assert_eq!(secs_delta("GAP", i64::MIN, 10), TimeDelta::seconds(10));
    }
}
