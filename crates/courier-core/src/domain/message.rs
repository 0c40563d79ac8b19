//! Chat message model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing message identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(u64);

impl AuthorId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The already-authenticated caller. Identity policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
}

impl Author {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: AuthorId::new(id),
            name: name.into(),
        }
    }
}

/// A message that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chat message. Created once, optionally deleted, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author_id: AuthorId,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            author_id: new.author.id,
            author_name: new.author.name,
            text: new.text,
            created_at: new.created_at,
        }
    }

    pub fn is_owned_by(&self, author: &Author) -> bool {
        self.author_id == author.id
    }

    pub fn view(&self) -> MessageView {
        MessageView::from(self)
    }
}

/// Client-facing shape of a message, as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub message: String,
    pub user: String,
    pub user_id: AuthorId,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            message: m.text.clone(),
            user: m.author_name.clone(),
            user_id: m.author_id,
            timestamp: m.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Message {
        Message::from_new(
            MessageId::new(7),
            NewMessage {
                author: Author::new(3, "alice"),
                text: "hello".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            },
        )
    }

    #[test]
    fn view_uses_camel_case_fields() {
        let v = serde_json::to_value(sample().view()).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["message"], "hello");
        assert_eq!(v["user"], "alice");
        assert_eq!(v["userId"], 3);
        assert_eq!(v["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn ownership_is_by_author_id() {
        let m = sample();
        assert!(m.is_owned_by(&Author::new(3, "renamed")));
        assert!(!m.is_owned_by(&Author::new(4, "alice")));
    }
}
