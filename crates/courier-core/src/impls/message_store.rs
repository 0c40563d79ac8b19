//! LocalMessageStore - 単一プロセス用の MessageStore

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::journal::{FileJournal, JournalEntry};
use crate::domain::{CourierError, Message, MessageId, NewMessage};
use crate::ports::MessageStore;

/// Remove lines tolerated in the journal before it is compacted.
const COMPACT_AFTER_REMOVES: usize = 256;

struct Inner {
    messages: BTreeMap<MessageId, Message>,
    /// High-water mark over every id ever issued, deleted ones included.
    next_id: u64,
    journal: Option<FileJournal<MessageId, Message>>,
    /// Remove lines written since the last compaction.
    removes: usize,
    compact_after: usize,
}

impl Inner {
    /// Rewrite the journal down to the live messages. If the newest id was
    /// deleted, a remove line for it is kept so the high-water mark survives.
    async fn compact(&mut self) -> Result<(), CourierError> {
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        let newest = MessageId::new(self.next_id - 1);
        let tombstones: Vec<MessageId> = if self.next_id > 1 && !self.messages.contains_key(&newest) {
            vec![newest]
        } else {
            Vec::new()
        };
        journal
            .rewrite_with_tombstones(self.messages.values(), &tombstones)
            .await?;
        info!(messages = self.messages.len(), dropped_removes = self.removes, "message journal compacted");
        self.removes = 0;
        Ok(())
    }
}

pub struct LocalMessageStore {
    inner: Mutex<Inner>,
}

impl LocalMessageStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: BTreeMap::new(),
                next_id: 1,
                journal: None,
                removes: 0,
                compact_after: COMPACT_AFTER_REMOVES,
            }),
        }
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        Self::open_compacting_after(path, COMPACT_AFTER_REMOVES).await
    }

    pub(crate) async fn open_compacting_after(
        path: impl AsRef<Path>,
        compact_after: usize,
    ) -> Result<Self, CourierError> {
        let (journal, entries) = FileJournal::<MessageId, Message>::open(path).await?;

        let mut messages = BTreeMap::new();
        let mut next_id = 1;
        let mut removes = 0;
        for entry in entries {
            match entry {
                JournalEntry::Put { record } => {
                    next_id = next_id.max(record.id.get() + 1);
                    messages.insert(record.id, record);
                }
                JournalEntry::Remove { key } => {
                    next_id = next_id.max(key.get() + 1);
                    messages.remove(&key);
                    removes += 1;
                }
            }
        }

        let mut inner = Inner {
            messages,
            next_id,
            journal: Some(journal),
            removes,
            compact_after: compact_after.max(1),
        };
        if inner.removes >= inner.compact_after {
            inner.compact().await?;
        }
        info!(messages = inner.messages.len(), next_id, "message store opened");

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

#[async_trait]
impl MessageStore for LocalMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<Message, CourierError> {
        let mut inner = self.inner.lock().await;
        let message = Message::from_new(MessageId::new(inner.next_id), message);
        if let Some(journal) = inner.journal.as_mut() {
            journal.append_puts([&message]).await?;
        }
        inner.next_id += 1;
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, CourierError> {
        Ok(self.inner.lock().await.messages.get(&id).cloned())
    }

    async fn delete(&self, id: MessageId) -> Result<bool, CourierError> {
        let mut inner = self.inner.lock().await;
        if !inner.messages.contains_key(&id) {
            return Ok(false);
        }
        if let Some(journal) = inner.journal.as_mut() {
            journal.append_remove(&id).await?;
            inner.removes += 1;
        }
        inner.messages.remove(&id);
        // remove 行は書けているので、compaction の失敗は次回に持ち越す
        if inner.removes >= inner.compact_after {
            if let Err(e) = inner.compact().await {
                warn!(error = %e, "message journal compaction failed");
            }
        }
        Ok(true)
    }

    async fn latest(&self, limit: usize) -> Result<Vec<Message>, CourierError> {
        let inner = self.inner.lock().await;
        let mut latest: Vec<Message> = inner.messages.values().rev().take(limit).cloned().collect();
        latest.reverse();
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Author;
    use chrono::Utc;
    use tempfile::TempDir;

    fn new_message(text: &str) -> NewMessage {
        NewMessage {
            author: Author::new(1, "alice"),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn latest_returns_newest_oldest_first() {
        let store = LocalMessageStore::in_memory();
        for text in ["a", "b", "c"] {
            store.insert(new_message(text)).await.unwrap();
        }

        let texts: Vec<String> = store
            .latest(2)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let store = LocalMessageStore::in_memory();
        let m = store.insert(new_message("a")).await.unwrap();

        assert!(store.delete(m.id).await.unwrap());
        assert!(!store.delete(m.id).await.unwrap());
        assert!(store.get(m.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let last = {
            let store = LocalMessageStore::open(&path).await.unwrap();
            store.insert(new_message("a")).await.unwrap();
            let b = store.insert(new_message("b")).await.unwrap();
            store.delete(b.id).await.unwrap();
            b.id
        };

        let store = LocalMessageStore::open(&path).await.unwrap();
        assert_eq!(store.latest(10).await.unwrap().len(), 1);
        let c = store.insert(new_message("c")).await.unwrap();
        assert!(c.id > last);
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn deletes_trigger_compaction_without_losing_the_id_mark() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let store = LocalMessageStore::open_compacting_after(&path, 2).await.unwrap();
        let a = store.insert(new_message("a")).await.unwrap();
        store.insert(new_message("b")).await.unwrap();
        let c = store.insert(new_message("c")).await.unwrap();
        store.delete(a.id).await.unwrap();
        assert_eq!(line_count(&path), 4);

        // 2 件目の delete で compaction: b の put と c の tombstone だけが残る
        store.delete(c.id).await.unwrap();
        assert_eq!(line_count(&path), 2);
        drop(store);

        let store = LocalMessageStore::open_compacting_after(&path, 2).await.unwrap();
        let texts: Vec<String> = store.latest(10).await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["b"]);
        let d = store.insert(new_message("d")).await.unwrap();
        assert!(d.id > c.id);
    }

    #[tokio::test]
    async fn long_journal_is_compacted_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        {
            let store = LocalMessageStore::open_compacting_after(&path, 100).await.unwrap();
            for text in ["a", "b", "c"] {
                let m = store.insert(new_message(text)).await.unwrap();
                if text != "b" {
                    store.delete(m.id).await.unwrap();
                }
            }
            assert_eq!(line_count(&path), 5);
        }

        let store = LocalMessageStore::open_compacting_after(&path, 2).await.unwrap();
        assert_eq!(line_count(&path), 2);
        assert_eq!(store.latest(10).await.unwrap().len(), 1);
    }
}
