//! Built-in tasks.

pub mod log_request;

pub use self::log_request::{
    DispatchReceipt, LogRequestHandler, RequestLog, dispatch_delay, dispatch_request_log,
};
