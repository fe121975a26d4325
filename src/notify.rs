//! Operator-facing notifications and audio cues.
//!
//! Notifications are transient and dismissible; nothing here blocks the
//! caller. Audio cues are fire-and-forget.

use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub trait AudioCue: Send + Sync {
    fn play(&self);
}

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => log::info!("{}: {}", notification.title, notification.description),
            Severity::Warning => {
                log::warn!("{}: {}", notification.title, notification.description)
            }
            Severity::Error => {
                log::error!("{}: {}", notification.title, notification.description)
            }
        }
    }
}

/// Keeps every notification in memory, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.notifications()
            .iter()
            .filter(|n| n.severity == severity)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push(notification);
        }
    }
}

/// Rings the terminal bell on stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play(&self) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Audio cue that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl AudioCue for Silent {
    fn play(&self) {}
}
