//! MessageStore port - chat message persistence.

use async_trait::async_trait;

use crate::domain::{CourierError, Message, MessageId, NewMessage};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assign the next id (strictly greater than any id ever issued) and store.
    async fn insert(&self, message: NewMessage) -> Result<Message, CourierError>;

    async fn get(&self, id: MessageId) -> Result<Option<Message>, CourierError>;

    /// Returns whether a message was removed.
    async fn delete(&self, id: MessageId) -> Result<bool, CourierError>;

    /// The newest `limit` messages, oldest first.
    async fn latest(&self, limit: usize) -> Result<Vec<Message>, CourierError>;
}
