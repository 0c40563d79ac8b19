//! Events fanned out to real-time subscribers.

use serde::{Deserialize, Serialize};

use super::message::{MessageId, MessageView};

/// What subscribers receive. `Created` carries the full view so clients can
/// render without a round trip; `Deleted` only needs the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    MessageCreated { message: MessageView },
    MessageDeleted { id: MessageId },
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::MessageCreated { .. } => "created",
            ChatEvent::MessageDeleted { .. } => "deleted",
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            ChatEvent::MessageCreated { message } => message.id,
            ChatEvent::MessageDeleted { id } => *id,
        }
    }
}
