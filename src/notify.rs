//! # Desktop Notifications
//!
//! Notifiche transitorie via `notify-send`, best effort: un fallimento finisce
//! nel log a livello debug e non interrompe mai la run.

use crate::config::Config;
use crate::platform::{run_tool, OutputMode};
use tracing::debug;

const TIMEOUT_MS: &str = "2000";
const ICON: &str = "multimedia-player";

/// Sends transient desktop notifications
#[derive(Debug, Clone)]
pub struct Notifier {
    program: String,
    enabled: bool,
}

impl Notifier {
    pub fn new(program: impl Into<String>, enabled: bool) -> Self {
        Self {
            program: program.into(),
            enabled,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.notify.clone(), config.notifications)
    }

    pub fn disabled() -> Self {
        Self::new(String::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn notify(&self, title: &str, text: &str) {
        if !self.enabled {
            return;
        }
        let args = ["-t", TIMEOUT_MS, "-i", ICON, title, text];
        if let Err(e) = run_tool(&self.program, args, OutputMode::Capture).await {
            debug!("Notification '{}' not shown: {}", text, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_never_fails() {
        Notifier::new("definitely-not-a-real-tool-4242", true)
            .notify("MTPSync", "Sync done.")
            .await;
        Notifier::disabled().notify("MTPSync", "Sync done.").await;
        assert!(!Notifier::disabled().is_enabled());
    }
}
