// src/logging.rs - correlated log prefixes for long-lived workers
use std::sync::atomic::{AtomicU64, Ordering};

// Global sequence number for correlating lines across workers
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub task_id: Option<String>,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            task_id: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn format(&self, message: &str) -> String {
        let task_info = match &self.task_id {
            Some(task) => format!(" task={}", task),
            None => String::new(),
        };

        format!(
            "[{}:{}{}][seq={:06}] {}",
            self.component, self.instance_id, task_info, self.sequence, message
        )
    }
}

/// Uniform logging for components that carry a [`LogContext`].
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("upload", "room:1234");

        assert_eq!(ctx.component, "upload");
        assert_eq!(ctx.instance_id, "room:1234");
        assert!(ctx.task_id.is_none());
    }

    #[test]
    fn test_sequence_increases() {
        let first = LogContext::new("a", "1");
        let second = LogContext::new("a", "1");
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_log_formatting() {
        let ctx = LogContext::new("cleanup", "local");
        let formatted = ctx.format("pass started");

        assert!(formatted.starts_with("[cleanup:local]"));
        assert!(formatted.contains("pass started"));

        let with_task = ctx.with_task("a.flv");
        assert!(with_task.format("x").contains("task=a.flv"));
    }

    #[test]
    fn test_component_logger_trait() {
        struct Worker {
            id: String,
        }

        impl ComponentLogger for Worker {
            fn log_context(&self) -> LogContext {
                LogContext::new("worker", &self.id)
            }
        }

        let worker = Worker {
            id: "w1".to_string(),
        };
        let ctx = worker.log_context();
        assert_eq!(ctx.component, "worker");
        assert_eq!(ctx.instance_id, "w1");
        worker.info("logging without a logger installed is a no-op");
    }
}
