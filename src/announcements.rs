//! Session-local announcement board.
//!
//! Announcements are ephemeral UI state: never written to the remote store,
//! gone with the session. A new board (page reload) starts again from the
//! seeded default; dismissals are final for the board's lifetime and
//! unaffected by any data refetch.

use chrono::{DateTime, Utc};

use crate::auth::SessionContext;
use crate::error::{DataError, DataResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AnnouncementKind {
    System,
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    /// Locally generated, monotonic by creation order.
    pub id: u64,
    pub topic: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub kind: AnnouncementKind,
}

pub struct AnnouncementBoard {
    next_id: u64,
    items: Vec<Announcement>,
}

impl AnnouncementBoard {
    /// A fresh board carrying the seeded system notice.
    pub fn new() -> Self {
        let mut board = Self {
            next_id: 1,
            items: Vec::new(),
        };
        board.push(
            "System Maintenance",
            "System will be down for maintenance on Sunday 10 PM.",
            AnnouncementKind::System,
        );
        board
    }

    /// Newest first.
    pub fn list(&self) -> &[Announcement] {
        &self.items
    }

    /// Publishes an announcement. HR only; topic and message must be
    /// non-empty.
    pub fn post(
        &mut self,
        ctx: &SessionContext,
        topic: &str,
        message: &str,
    ) -> DataResult<&Announcement> {
        ctx.require_hr()?;
        if topic.trim().is_empty() || message.trim().is_empty() {
            return Err(DataError::Validation(
                "announcement topic and message are required".into(),
            ));
        }
        self.push(topic, message, AnnouncementKind::General);
        Ok(&self.items[0])
    }

    /// Removes the announcement; returns whether anything was dismissed.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a.id != id);
        self.items.len() != before
    }

    fn push(&mut self, topic: &str, message: &str, kind: AnnouncementKind) {
        let announcement = Announcement {
            id: self.next_id,
            topic: topic.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
            kind,
        };
        self.next_id += 1;
        self.items.insert(0, announcement);
    }
}

impl Default for AnnouncementBoard {
    fn default() -> Self {
        Self::new()
    }
}
