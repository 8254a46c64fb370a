use anyhow::{Context, Result};
use argus_core::{
    DetectionRouter, Gallery, Ledger, LedgerPolicy, MetricMatcher, SnapshotArchive, UnknownLog,
    UnknownLogPolicy,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod ingest;
mod notifier;

use config::Config;
use notifier::{Notifier, TelegramSink};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("argusd starting");

    let config = Config::from_env();

    let gallery = if config.gallery_path.exists() {
        Gallery::load(&config.gallery_path)
            .with_context(|| format!("loading gallery {}", config.gallery_path.display()))?
    } else {
        tracing::warn!(
            path = %config.gallery_path.display(),
            "no gallery file; every face will be treated as unknown"
        );
        Gallery::empty()
    };

    let router = DetectionRouter::new(
        gallery,
        MetricMatcher::new(config.match_metric),
        Ledger::new(
            &config.ledger_path,
            LedgerPolicy {
                time_gap: config.time_gap,
                confidence_floor: config.confidence_floor,
            },
        ),
        UnknownLog::new(
            &config.unknown_log_path,
            &config.unknown_dir,
            UnknownLogPolicy {
                cooldown: config.unknown_gap,
                metric: config.cluster_metric,
            },
        ),
        SnapshotArchive::new(&config.snapshot_dir),
    )
    .with_mode(config.detection_mode)
    .with_targets(&config.targets);

    tracing::info!(
        mode = %config.detection_mode,
        match_metric = %config.match_metric,
        cluster_metric = %config.cluster_metric,
        targets = ?config.targets,
        ledger = %config.ledger_path.display(),
        "router configured"
    );

    let recorder = engine::spawn_recorder(router).context("spawning recorder thread")?;

    let notifier = match (&config.telegram_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let sink = TelegramSink::new(
                token.clone(),
                chat_id.clone(),
                Duration::from_secs(config.notify_timeout_secs),
            )
            .context("building notification client")?;
            Some(Notifier::new(
                sink,
                Duration::from_secs(config.notify_cooldown_secs),
            ))
        }
        _ => {
            tracing::info!("telegram credentials not set; notifications disabled");
            None
        }
    };

    // Held for the lifetime of the process; dropping it unregisters the service.
    let _dbus = if config.dbus_enabled {
        match serve_dbus(recorder.clone()).await {
            Ok(conn) => Some(conn),
            Err(err) => {
                tracing::warn!(error = %err, "D-Bus interface unavailable; continuing without it");
                None
            }
        }
    } else {
        None
    };

    tracing::info!("argusd ready; reading detections from stdin");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = ingest::run(stdin, recorder, notifier) => {
            res.context("reading detection feed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    tracing::info!("argusd shutting down");
    Ok(())
}

async fn serve_dbus(recorder: engine::RecorderHandle) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(dbus_interface::BUS_NAME)?
        .serve_at(
            dbus_interface::OBJECT_PATH,
            dbus_interface::ArgusService { recorder },
        )?
        .build()
        .await
}
