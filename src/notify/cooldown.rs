// src/notify/cooldown.rs
use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Simple cooldown gate to prevent alert spam.
/// - First alert for a key always allowed.
/// - Inside cooldown, alerts for that key are suppressed.
/// - State is updated explicitly via `record_alert` after a successful send.
#[derive(Debug, Default)]
pub struct AlertCooldown {
    cooldown: ChronoDuration,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl AlertCooldown {
    /// `cooldown_secs` < 0 is treated as 0 (no cooldown).
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: ChronoDuration::seconds(cooldown_secs.max(0)),
            last_alert: HashMap::new(),
        }
    }

    /// Check if we may alert at `now` for `key`. Does NOT mutate state.
    pub fn should_alert(&self, key: &str, now: DateTime<Utc>) -> bool {
        match self.last_alert.get(key) {
            None => true,
            Some(ts) => now.signed_duration_since(*ts) >= self.cooldown,
        }
    }

    /// Record that an alert was sent at `now` for `key`.
    pub fn record_alert(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_alert.insert(key.to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_alert_passes() {
        let cd = AlertCooldown::new(3_600);
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        assert!(cd.should_alert("source:a", now));
    }

    #[test]
    fn inside_cooldown_blocked() {
        let mut cd = AlertCooldown::new(3_600);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        cd.record_alert("source:a", t0);
        let t1 = t0 + ChronoDuration::seconds(120);
        assert!(!cd.should_alert("source:a", t1));
        // Different key is unaffected.
        assert!(cd.should_alert("source:b", t1));
    }

    #[test]
    fn after_cooldown_passes() {
        let mut cd = AlertCooldown::new(3_600);
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        cd.record_alert("source:a", t0);
        let t_after = t0 + ChronoDuration::seconds(3_600 + 5);
        assert!(cd.should_alert("source:a", t_after));
    }
}
