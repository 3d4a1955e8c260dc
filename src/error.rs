use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

pub type CapacityResult<T> = Result<T, CapacityError>;

/// Failures of a single `ensure_capacity` call.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("unable to check available capacity on {backend}: {source}")]
    Measure {
        backend: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("unable to list removables on {backend}: {source}")]
    Listing {
        backend: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("error removing {item} on {backend}; stopping: {source}")]
    Removal {
        backend: String,
        item: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("could not ensure capacity on {backend} in {iterations} iterations")]
    Exhausted { backend: String, iterations: usize },
    #[error("capacity check on {backend} cancelled")]
    Cancelled { backend: String },
    #[error("capacity check on {backend} timed out after {after:?}")]
    TimedOut { backend: String, after: Duration },
}

impl CapacityError {
    pub fn measure(backend: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Measure {
            backend: backend.into(),
            source: source.into().into(),
        }
    }

    pub fn listing(backend: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Listing {
            backend: backend.into(),
            source: source.into().into(),
        }
    }

    pub fn removal(
        backend: impl Into<String>,
        item: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Removal {
            backend: backend.into(),
            item: item.into(),
            source: source.into().into(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Backpressure failures of the bounded work queues.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{queue} queue still full after {waited:?}")]
    Timeout {
        queue: &'static str,
        waited: Duration,
    },
    #[error("{queue} queue is closed")]
    Closed { queue: &'static str },
    #[error("{queue} queue is full")]
    Full { queue: &'static str },
}
