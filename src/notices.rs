//! User-visible outcomes for mutations. Every write either succeeds or fails
//! loudly; nothing is swallowed.

use tokio::sync::broadcast;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserNotice {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

/// Broadcast hub the presentation layer subscribes to for toast-style
/// notices. Publishing with no subscribers is fine; the notice is dropped.
pub struct NoticeHub {
    tx: broadcast::Sender<UserNotice>,
}

impl NoticeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotice> {
        self.tx.subscribe()
    }

    pub fn success(&self, title: &str, body: &str) {
        self.publish(title, body, Severity::Success);
    }

    pub fn error(&self, title: &str, body: &str) {
        self.publish(title, body, Severity::Error);
    }

    fn publish(&self, title: &str, body: &str, severity: Severity) {
        let notice = UserNotice {
            title: title.to_string(),
            body: body.to_string(),
            severity,
        };
        if self.tx.send(notice).is_err() {
            tracing::debug!(title, "notice dropped, no subscribers");
        }
    }
}

impl Default for NoticeHub {
    fn default() -> Self {
        Self::new(64)
    }
}
