//! Typed - 型付き Task API
//!
//! 利用側は `Task` と `Handler<T>` だけを書く。registry の中では
//! `JsonHandler` がペイロードを decode する `DynHandler` として保持される。

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, JsonHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;
