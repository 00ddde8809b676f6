//! tunnel-driver-dns: arbitrary byte streams over DNS
//!
//! A tunnel driver is "layer 2" for a covert channel: it moves packets of
//! bytes, each with a known maximum length, inside DNS questions and answers.
//! There is no ordering, de-duplication or retransmission at this level; that
//! belongs to whatever protocol is fed through it.
//!
//! ## How data flows
//!
//! ```text
//! client ──▶ 41414141.tunnel.example.com (TXT?) ──▶ Driver
//!                                                    │ Reader: strip affix, decode
//!                                                    ▼
//!                                             Sink::feed("AAAA", max_length)
//!                                                    │
//!                                                    ▼
//! client ◀── TXT "4242" ◀── RecordBuilder ◀──── reply "BB"
//! ```
//!
//! A query belongs to a route when its name starts with `tag.` or ends with
//! `.domain`. Each route carries its own sink and [`Codec`]. The reply is
//! packed into A, AAAA, CNAME, MX, NS or TXT records, whichever was asked for
//! (ANY picks one at random, never AAAA).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunnel_driver_dns::{Codec, Driver, DriverConfig, SinkError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tunnel_driver_dns::TunnelError> {
//!     let config = DriverConfig {
//!         port: 5353,
//!         ..DriverConfig::default()
//!     };
//!     let driver = Driver::new(&config)?;
//!
//!     let echo = |data: &[u8], _max_length: usize| -> Result<Option<Vec<u8>>, SinkError> {
//!         Ok(Some(data.to_vec()))
//!     };
//!     driver.add_domain("tunnel.example.com", Arc::new(echo), Codec::Hex)?;
//!
//!     driver.start().await?;
//!     driver.wait().await;
//!     Ok(())
//! }
//! ```

pub mod builders;
pub mod codec;
pub mod config;
pub mod dns;
pub mod driver;
pub mod name_budget;
pub mod random;
pub mod reader;
pub mod sink;
pub mod sinks;

pub use builders::{RecordBuilder, MAX_NAME_LENGTH, MAX_PACKED_RR_LENGTH, MAX_RR_LENGTH};
pub use codec::Codec;
pub use config::{DriverConfig, RouteConfig};
pub use dns::{Message, Question, RData, Rcode, Record, RecordType, Upstream};
pub use driver::{Driver, RouteKind, RouteOptions};
pub use name_budget::NameBudget;
pub use random::{Randomness, SequenceRandomness, ThreadRandomness};
pub use sink::{Sink, SinkError, SinkHandle};

/// How bad a per-question fault is.
///
/// Both levels answer SERVFAIL; the difference is only in how loudly the
/// fault is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Bad input, an oversized reply, a sink that said no
    Recoverable,
    /// Something that should be impossible; indicates a bug in this crate or the sink
    Bug,
}

/// Tunnel driver error types
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// Payload exceeds a builder's length budget
    #[error("Tried to encode too much data: {length} bytes (max: {max})")]
    PayloadTooLarge { length: usize, max: usize },

    /// Malformed hex/base32 input
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// New tag/domain overlaps an existing one
    #[error("The {kind} '{new}' conflicts with the existing {kind} '{existing}'")]
    ConflictingRoute {
        kind: RouteKind,
        new: String,
        existing: String,
    },

    /// Question type has no builder
    #[error("Received a DNS question of unknown type: {0}")]
    UnsupportedRecordType(RecordType),

    /// Sink returned more than it was allowed to
    #[error("The sink returned too much data: {length} bytes (max: {max})")]
    SinkOverflow { length: usize, max: usize },

    /// A built record doesn't fit on the wire despite the budget checks
    #[error("Built record failed the packed length check: {0} (this is an internal bug)")]
    InternalInvariantViolation(String),

    /// start/stop/kill called in the wrong state
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Sink reported a fault
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Malformed or unexpected DNS message
    #[error("DNS protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    pub fn severity(&self) -> Severity {
        match self {
            TunnelError::InternalInvariantViolation(_) | TunnelError::Sink(SinkError::Bug(_)) => {
                Severity::Bug
            }
            _ => Severity::Recoverable,
        }
    }
}

impl From<dns::DnsError> for TunnelError {
    fn from(err: dns::DnsError) -> Self {
        match err {
            dns::DnsError::IoError(e) => TunnelError::Io(e),
            other => TunnelError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
