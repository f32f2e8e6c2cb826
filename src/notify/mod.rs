// src/notify/mod.rs
// Operational alerting: source health transitions and SLA breaches fan out
// to whatever channels are configured. Alert failures are logged and never
// affect pipeline results.

pub mod cooldown;
pub mod email;
pub mod slack;

use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use cooldown::AlertCooldown;

#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    SourceFailing {
        source_id: String,
        error: String,
        ts: DateTime<Utc>,
    },
    SourceRecovered {
        source_id: String,
        ts: DateTime<Utc>,
    },
    SlaBreach {
        refreshed_ratio: f64,
        ts: DateTime<Utc>,
    },
}

impl AlertEvent {
    /// Cooldown key: repeats of the same condition share one gate.
    pub fn key(&self) -> String {
        match self {
            AlertEvent::SourceFailing { source_id, .. } => format!("failing:{source_id}"),
            AlertEvent::SourceRecovered { source_id, .. } => format!("recovered:{source_id}"),
            AlertEvent::SlaBreach { .. } => "sla".to_string(),
        }
    }

    pub fn subject(&self) -> String {
        match self {
            AlertEvent::SourceFailing { source_id, .. } => {
                format!("jobpulse: source {source_id} is failing")
            }
            AlertEvent::SourceRecovered { source_id, .. } => {
                format!("jobpulse: source {source_id} recovered")
            }
            AlertEvent::SlaBreach { refreshed_ratio, .. } => format!(
                "jobpulse: freshness SLA breach ({:.0}% sources refreshed)",
                refreshed_ratio * 100.0
            ),
        }
    }

    pub fn body(&self) -> String {
        match self {
            AlertEvent::SourceFailing {
                source_id,
                error,
                ts,
            } => format!(
                "Source {source_id} crossed the consecutive-failure threshold.\nLast error: {error}\n@ {}",
                ts.to_rfc3339()
            ),
            AlertEvent::SourceRecovered { source_id, ts } => format!(
                "Source {source_id} succeeded again and was restored to active.\n@ {}",
                ts.to_rfc3339()
            ),
            AlertEvent::SlaBreach { refreshed_ratio, ts } => format!(
                "Only {:.1}% of active sources were refreshed inside the freshness window (target 80%).\n@ {}",
                refreshed_ratio * 100.0,
                ts.to_rfc3339()
            ),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AlertEvent) -> Result<()>;
}

/// Fan-out over all configured channels, with a shared cooldown gate.
/// Channels missing their env configuration are silently disabled, so a bare
/// dev environment alerts nowhere and breaks nothing.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
    cooldown: Mutex<AlertCooldown>,
}

impl NotifierMux {
    pub fn from_env() -> Self {
        let cooldown_secs: i64 = std::env::var("ALERT_COOLDOWN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3_600);

        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        channels.push(Box::new(slack::SlackNotifier::from_env()));
        if let Some(email) = email::EmailNotifier::from_env() {
            channels.push(Box::new(email));
        }

        Self {
            channels,
            cooldown: Mutex::new(AlertCooldown::new(cooldown_secs)),
        }
    }

    /// Mux with no channels and no cooldown state; used by tests and by
    /// engines constructed without alerting.
    pub fn disabled() -> Self {
        Self {
            channels: Vec::new(),
            cooldown: Mutex::new(AlertCooldown::new(0)),
        }
    }

    pub async fn notify(&self, ev: &AlertEvent, now: DateTime<Utc>) {
        let key = ev.key();
        {
            let g = self.cooldown.lock().expect("cooldown mutex poisoned");
            if !g.should_alert(&key, now) {
                tracing::debug!(key, "alert suppressed by cooldown");
                return;
            }
        }

        let mut sent_any = false;
        for ch in &self.channels {
            match ch.send(ev).await {
                Ok(()) => sent_any = true,
                Err(e) => warn!(error = ?e, "alert channel failed"),
            }
        }

        if sent_any {
            let mut g = self.cooldown.lock().expect("cooldown mutex poisoned");
            g.record_alert(&key, now);
        }
    }
}
