// DNS message plumbing for the tunnel driver
//
// Just enough of RFC 1035 to parse a question, answer it with
// A/AAAA/CNAME/MX/NS/TXT records, fail it, or forward it upstream.

pub mod protocol;
pub mod transport;

pub use protocol::{Header, Message, Question, RData, Rcode, Record, RecordType, CLASS_IN};
pub use transport::{serve, Transaction, Upstream};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid DNS message: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DnsError>;
