//! Best-effort dependency notifications to a supervising process.
//!
//! A reporter failure is logged and otherwise ignored: whether anyone is
//! listening never changes a resolve or load outcome.

use std::io::Write;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

/// A message for the parent process, serialized as `{"type": .., ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    Dependency { path: String },
}

impl Notification {
    pub fn dependency(path: impl Into<String>) -> Self {
        Notification::Dependency { path: path.into() }
    }
}

pub trait DependencyReporter: Send + Sync {
    fn report(&self, notification: &Notification);
}

/// Writes each notification as one JSON line, e.g. to an IPC pipe or stderr.
pub struct IpcReporter<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> IpcReporter<W> {
    pub fn new(writer: W) -> Self {
        IpcReporter {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> DependencyReporter for IpcReporter<W> {
    fn report(&self, notification: &Notification) {
        let line = match serde_json::to_string(notification) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "failed to serialize notification");
                return;
            }
        };
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|()| writer.flush()) {
            debug!(error = %e, "failed to send notification");
        }
    }
}

/// Forwards notifications to an in-process receiver.
pub struct ChannelReporter {
    sender: Mutex<Sender<Notification>>,
}

impl ChannelReporter {
    pub fn new(sender: Sender<Notification>) -> Self {
        ChannelReporter {
            sender: Mutex::new(sender),
        }
    }
}

impl DependencyReporter for ChannelReporter {
    fn report(&self, notification: &Notification) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        if sender.send(notification.clone()).is_err() {
            debug!("notification receiver dropped");
        }
    }
}
