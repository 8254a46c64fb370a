//! Fire-and-forget detection alerts with a per-identity cooldown.
//!
//! Each alert runs on its own task. Failures are logged inside that task
//! and never reach the detection loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for detection alerts.
pub trait AlertSink: Send + Sync + 'static {
    fn send(&self, name: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Telegram Bot API `sendMessage` sink.
pub struct TelegramSink {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: String, chat_id: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            chat_id,
        })
    }
}

impl AlertSink for TelegramSink {
    fn send(&self, name: &str) -> impl Future<Output = Result<(), NotifyError>> + Send {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let text = format!("ALERT: {name} has been detected!");
        let request = self
            .client
            .post(url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text.as_str())]);

        async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Spawns one alert task per detection, rate-limited per identity.
pub struct Notifier<S> {
    sink: Arc<S>,
    cooldown: Duration,
    last_sent: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<S> Clone for Notifier<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            cooldown: self.cooldown,
            last_sent: Arc::clone(&self.last_sent),
        }
    }
}

impl<S: AlertSink> Notifier<S> {
    pub fn new(sink: S, cooldown: Duration) -> Self {
        Self {
            sink: Arc::new(sink),
            cooldown,
            last_sent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a background alert for `name` and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn notify(&self, name: &str) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { this.deliver(&name).await })
    }

    async fn deliver(&self, name: &str) {
        let now = Instant::now();
        let Some(previous) = self.claim(name, now) else {
            tracing::debug!(name, "notification in cooldown; skipped");
            return;
        };

        match self.sink.send(name).await {
            Ok(()) => tracing::info!(name, "notification sent"),
            Err(err) => {
                tracing::warn!(name, error = %err, "notification failed");
                self.release(name, now, previous);
            }
        }
    }

    /// Reserve the cooldown slot for `name`.
    ///
    /// Returns `None` when still cooling down, otherwise the previous send
    /// time so a failed delivery can restore it.
    fn claim(&self, name: &str, now: Instant) -> Option<Option<Instant>> {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last_sent.get(name).copied();
        if previous.is_some_and(|t| now.duration_since(t) < self.cooldown) {
            return None;
        }
        last_sent.insert(name.to_string(), now);
        Some(previous)
    }

    fn release(&self, name: &str, claimed: Instant, previous: Option<Instant>) {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        // Only roll back our own claim.
        if last_sent.get(name) != Some(&claimed) {
            return;
        }
        match previous {
            Some(t) => last_sent.insert(name.to_string(), t),
            None => last_sent.remove(name),
        };
    }
}
