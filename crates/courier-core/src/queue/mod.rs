//! Queue module: task state machine, retry policy and the in-memory table.

mod record;
mod retry;
mod state;
mod table;

pub use record::{Lease, TaskRecord};
pub use retry::RetryPolicy;
pub use state::TaskState;
pub use table::TaskTable;
