use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::CompletionKind;
use crate::pane::PaneId;

/// Store key of the runtime notification settings.
pub const NOTIFY_KEY: &str = "notify-settings";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifySettings {
    pub enabled: bool,
    /// Commands finishing faster than this are not announced. Fractional
    /// values are allowed; negative ones count as zero.
    pub threshold_seconds: f64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        NotifySettings {
            enabled: true,
            threshold_seconds: 10.0,
        }
    }
}

impl NotifySettings {
    pub fn should_notify(&self, elapsed: Duration) -> bool {
        self.enabled && elapsed.as_secs_f64() >= self.threshold_seconds.max(0.0)
    }
}

/// A finished command worth telling the user about.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub pane: PaneId,
    pub pane_name: String,
    pub label: Option<String>,
    pub elapsed: Duration,
    pub kind: CompletionKind,
}

impl Notification {
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs()
    }

    pub fn title(&self) -> String {
        match &self.label {
            Some(label) => format!("{} finished", label),
            None => "Command finished".to_string(),
        }
    }

    pub fn body(&self) -> String {
        format!("{} · {}", self.pane_name, format_elapsed(self.elapsed))
    }
}

/// `Xm Ys` from one minute up, `Ys` below.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_filter() {
        let settings = NotifySettings { enabled: true, threshold_seconds: 10.0 };
        assert!(!settings.should_notify(Duration::from_secs(3)));
        assert!(settings.should_notify(Duration::from_secs(15)));
        assert!(settings.should_notify(Duration::from_secs(10)));
        let off = NotifySettings { enabled: false, ..settings };
        assert!(!off.should_notify(Duration::from_secs(600)));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2s");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "59s");
        assert_eq!(format_elapsed(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_settings_wire_format() {
        let json = serde_json::to_value(NotifySettings::default()).unwrap();
        assert_eq!(json, serde_json::json!({"enabled": true, "thresholdSeconds": 10.0}));
        let parsed: NotifySettings =
            serde_json::from_value(serde_json::json!({"enabled": false, "thresholdSeconds": 30})).unwrap();
        assert_eq!(parsed, NotifySettings { enabled: false, threshold_seconds: 30.0 });
        let parsed: NotifySettings =
            serde_json::from_value(serde_json::json!({"enabled": true, "thresholdSeconds": 2.5})).unwrap();
        assert_eq!(parsed.threshold_seconds, 2.5);
        assert!(!parsed.should_notify(Duration::from_millis(2499)));
        assert!(parsed.should_notify(Duration::from_millis(2500)));
    }

    #[test]
    fn test_notification_text() {
        let n = Notification {
            pane: 3,
            pane_name: "api".into(),
            label: Some("cargo build".into()),
            elapsed: Duration::from_secs(75),
            kind: CompletionKind::Prompt,
        };
        assert_eq!(n.title(), "cargo build finished");
        assert_eq!(n.body(), "api · 1m 15s");
        assert_eq!(n.elapsed_seconds(), 75);
    }
}
