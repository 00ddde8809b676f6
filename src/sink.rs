//! Sinks: the layer above the driver
//!
//! A sink receives each decoded payload together with the most it may send
//! back, and returns the reply (or `None` for nothing). It is called from the
//! listener's tasks, possibly concurrently, so it must be `Send + Sync`.

use std::sync::Arc;
use thiserror::Error;

/// Fault reported by a sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink refused this payload; logged as an ordinary error
    #[error("{0}")]
    Recoverable(String),

    /// The sink hit something that should never happen; logged loudly
    #[error("{0}")]
    Bug(String),
}

pub trait Sink: Send + Sync {
    /// Handle one incoming payload. The reply must not exceed `max_length` bytes.
    fn feed(&self, data: &[u8], max_length: usize) -> Result<Option<Vec<u8>>, SinkError>;
}

impl<F> Sink for F
where
    F: Fn(&[u8], usize) -> Result<Option<Vec<u8>>, SinkError> + Send + Sync,
{
    fn feed(&self, data: &[u8], max_length: usize) -> Result<Option<Vec<u8>>, SinkError> {
        self(data, max_length)
    }
}

/// Shared handle to a sink, as stored in the route table
pub type SinkHandle = Arc<dyn Sink>;
