//! Domain model (IDs, tasks, messages, events, errors, decisions).

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod task;

pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{CourierError, ErrorKind};
pub use events::ChatEvent;
pub use ids::{LeaseId, TaskId};
pub use message::{Author, AuthorId, Message, MessageId, MessageView, NewMessage};
pub use task::{TaskEnvelope, TaskType};
