//! TypedRegistry - task_type から handler を引く表
//!
//! builder で組み立てたあとは読み取り専用。`DelayedTaskQueue` が `Arc` で
//! 持ち、ワーカー間でロックなしに共有する。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, JsonHandler};
use super::task::Task;
use crate::domain::{CourierError, TaskType};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("task type '{0}' already has a handler")]
    AlreadyRegistered(String),
}

#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<TaskType, Arc<dyn DynHandler>>,
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One handler per task type; a second registration is an error.
    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = TaskType::new(T::TYPE);
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(T::TYPE.to_string()));
        }
        self.handlers
            .insert(task_type, Arc::new(JsonHandler::<T, H>::new(handler)));
        Ok(())
    }

    /// The handler for `task_type`, or `UnknownTaskType`.
    pub fn resolve(&self, task_type: &TaskType) -> Result<Arc<dyn DynHandler>, CourierError> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| CourierError::UnknownTaskType(task_type.to_string()))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(&TaskType::new(task_type))
    }

    /// Entries of `expected` with no handler, in the given order.
    pub fn missing<'a>(&self, expected: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        expected
            .into_iter()
            .filter(|t| !self.contains(t))
            .map(str::to_string)
            .collect()
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().map(|t| t.to_string()).collect();
        types.sort();
        types
    }
}
