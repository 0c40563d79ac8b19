//! ChatService - メッセージ投稿・削除と Broadcaster の橋渡し
//!
//! 検証・権限エラーのときは状態を変えず、イベントも流さない。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::broadcast::Broadcaster;
use crate::config::ChatConfig;
use crate::domain::{Author, ChatEvent, CourierError, MessageId, MessageView, NewMessage};
use crate::ports::{Clock, MessageStore};

/// Input for posting a message. `text` is already trimmed.
#[derive(Debug, Deserialize, Validate)]
pub struct PostMessageInput {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
}

impl PostMessageInput {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
        }
    }
}

pub struct ChatService {
    store: Arc<dyn MessageStore>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            clock,
            history_limit: config.history_limit,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Validate, persist and announce a new message.
    pub async fn post_message(&self, author: &Author, text: &str) -> Result<MessageView, CourierError> {
        let input = PostMessageInput::new(text);
        input
            .validate()
            .map_err(|e| CourierError::Validation(e.to_string()))?;

        let message = self
            .store
            .insert(NewMessage {
                author: author.clone(),
                text: input.text,
                created_at: self.clock.now(),
            })
            .await?;
        let view = message.view();

        let recipients = self.broadcaster.publish(ChatEvent::MessageCreated {
            message: view.clone(),
        });
        info!(message_id = %message.id, author = %author.id, recipients, "message posted");
        Ok(view)
    }

    /// Delete a message. Only its author may do so.
    pub async fn delete_message(&self, author: &Author, id: MessageId) -> Result<(), CourierError> {
        let message = self
            .store
            .get(id)
            .await?
            .ok_or(CourierError::MessageNotFound(id))?;

        if !message.is_owned_by(author) {
            warn!(message_id = %id, author = %author.id, "delete refused: not the author");
            return Err(CourierError::PermissionDenied(format!(
                "message {id} belongs to another user"
            )));
        }

        if !self.store.delete(id).await? {
            return Err(CourierError::MessageNotFound(id));
        }

        let recipients = self.broadcaster.publish(ChatEvent::MessageDeleted { id });
        info!(message_id = %id, author = %author.id, recipients, "message deleted");
        Ok(())
    }

    /// The latest messages, oldest first.
    pub async fn recent_messages(&self) -> Result<Vec<MessageView>, CourierError> {
        let messages = self.store.latest(self.history_limit).await?;
        Ok(messages.iter().map(|m| m.view()).collect())
    }
}
