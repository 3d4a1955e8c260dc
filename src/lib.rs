// src/lib.rs
pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod drive;
pub mod error;
pub mod event;
pub mod live;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod storage;
pub mod testing;
pub mod upload;
pub mod web;

// Re-export the most used types
pub use dispatch::{DispatchError, Dispatcher};
pub use error::{CapacityError, QueueError};
pub use logging::{ComponentLogger, LogContext};
pub use storage::{CapacityBackend, ensure_capacity};
