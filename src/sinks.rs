//! Demonstration sinks: echo, discard and chargen
//!
//! Toys that show the sink contract from the outside. They are what the
//! `tunnel-driver-dns` binary runs; don't expose them anywhere that matters,
//! since chargen will happily hand random data to anyone who asks.

use crate::random::{Randomness, ThreadRandomness};
use crate::sink::{Sink, SinkError};
use rand::Rng;
use std::str::FromStr;

/// Echo settings. Upcase and downcase together randomize the case of each byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoOptions {
    pub reverse: bool,
    pub upcase: bool,
    pub downcase: bool,
    pub rot13: bool,
}

/// Sends back what it receives, optionally transformed. The reply is never
/// shortened; one that doesn't fit is the driver's to reject.
pub struct EchoSink {
    options: EchoOptions,
    randomness: Box<dyn Randomness>,
}

impl EchoSink {
    pub fn new(options: EchoOptions) -> Self {
        Self::with_randomness(options, Box::new(ThreadRandomness))
    }

    pub fn with_randomness(options: EchoOptions, randomness: Box<dyn Randomness>) -> Self {
        Self { options, randomness }
    }

    fn transform(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();

        if self.options.reverse {
            out.reverse();
        }

        match (self.options.upcase, self.options.downcase) {
            (true, true) => {
                for b in out.iter_mut() {
                    *b = if self.randomness.choose_index(2) == 0 {
                        b.to_ascii_uppercase()
                    } else {
                        b.to_ascii_lowercase()
                    };
                }
            }
            (true, false) => out.make_ascii_uppercase(),
            (false, true) => out.make_ascii_lowercase(),
            (false, false) => {}
        }

        if self.options.rot13 {
            for b in out.iter_mut() {
                *b = rot13(*b);
            }
        }

        out
    }
}

fn rot13(b: u8) -> u8 {
    match b {
        b'a'..=b'z' => (b - b'a' + 13) % 26 + b'a',
        b'A'..=b'Z' => (b - b'A' + 13) % 26 + b'A',
        _ => b,
    }
}

impl Sink for EchoSink {
    fn feed(&self, data: &[u8], max_length: usize) -> Result<Option<Vec<u8>>, SinkError> {
        log::info!("IN: {}", String::from_utf8_lossy(data));

        let out = self.transform(data);
        if out.len() > max_length {
            log::warn!("Echoing {} bytes, more than the {} that fit", out.len(), max_length);
        }

        log::info!("OUT: {}", String::from_utf8_lossy(&out));
        Ok(Some(out))
    }
}

/// What the discard sink answers with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscardResponse {
    /// An empty reply
    #[default]
    Blank,
    /// No reply at all
    Nil,
    /// A recoverable sink error
    Error,
    /// A bug-severity sink error
    Critical,
}

impl FromStr for DiscardResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blank" => Ok(DiscardResponse::Blank),
            "nil" => Ok(DiscardResponse::Nil),
            "error" => Ok(DiscardResponse::Error),
            "critical" => Ok(DiscardResponse::Critical),
            other => Err(format!(
                "The response options are 'blank', 'nil', 'error', or 'critical' (got '{}')",
                other
            )),
        }
    }
}

/// Logs what it receives and sends nothing useful back
pub struct DiscardSink {
    response: DiscardResponse,
    error_text: String,
}

impl DiscardSink {
    pub fn new(response: DiscardResponse, error_text: &str) -> Self {
        Self {
            response,
            error_text: error_text.to_string(),
        }
    }
}

impl Sink for DiscardSink {
    fn feed(&self, data: &[u8], _max_length: usize) -> Result<Option<Vec<u8>>, SinkError> {
        log::info!("IN: {}", String::from_utf8_lossy(data));

        match self.response {
            DiscardResponse::Blank => Ok(Some(Vec::new())),
            DiscardResponse::Nil => Ok(None),
            DiscardResponse::Error => Err(SinkError::Recoverable(self.error_text.clone())),
            DiscardResponse::Critical => Err(SinkError::Bug(self.error_text.clone())),
        }
    }
}

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fills every reply to the brim with random characters
pub struct ChargenSink {
    binary: bool,
}

impl ChargenSink {
    /// With `binary`, any byte value; otherwise `[a-zA-Z0-9]`
    pub fn new(binary: bool) -> Self {
        Self { binary }
    }
}

impl Sink for ChargenSink {
    fn feed(&self, data: &[u8], max_length: usize) -> Result<Option<Vec<u8>>, SinkError> {
        log::info!("IN: {}", String::from_utf8_lossy(data));

        let mut rng = rand::thread_rng();
        let out: Vec<u8> = if self.binary {
            (0..max_length).map(|_| rng.gen::<u8>()).collect()
        } else {
            (0..max_length)
                .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())])
                .collect()
        };

        Ok(Some(out))
    }
}
