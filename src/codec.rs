//! Payload codecs
//!
//! DNS names only tolerate a small alphabet, so every payload byte that goes
//! into a name (or a TXT string) is transcoded first. Two codecs exist:
//!
//! - **Hex**: `'AAA'` becomes `'414141'`. Simple, 2.0x expansion.
//! - **Base32**: RFC 4648 alphabet without padding, lowercased on the wire,
//!   1.6x expansion.
//!
//! Both are stateless; a route picks one by name (`"hex"` or `"base32"`).

use crate::TunnelError;
use data_encoding::{BASE32, BASE32_NOPAD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte <-> text transcoder used for names and TXT records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Codec {
    /// Lowercase hexadecimal, `[a-f0-9]`
    #[default]
    Hex,
    /// Unpadded base32, `[A-Z2-7]` (case-insensitive on decode)
    Base32,
}

impl Codec {
    /// All codecs, in lookup order
    pub const ALL: [Codec; 2] = [Codec::Hex, Codec::Base32];

    /// Look up a codec by name, ignoring case
    pub fn from_name(name: &str) -> Result<Self, TunnelError> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| TunnelError::Config(format!("Unknown codec: {}", name)))
    }

    /// Short name used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Hex => "hex",
            Codec::Base32 => "base32",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Codec::Hex => "Encodes to hex; for example, 'AAA' becomes '414141'. Simplest, but the least efficient.",
            Codec::Base32 => "Encodes to base32, which is letters and digits only",
        }
    }

    /// Characters produced per input byte
    pub fn ratio(&self) -> f64 {
        match self {
            Codec::Hex => 2.0,
            Codec::Base32 => 1.6,
        }
    }

    /// Largest raw length whose encoding fits in `encoded_len` characters.
    ///
    /// Equivalent to `floor(encoded_len / ratio)`, computed in integers so
    /// 1.6 never rounds the wrong way.
    pub fn max_decoded_len(&self, encoded_len: usize) -> usize {
        match self {
            Codec::Hex => encoded_len / 2,
            Codec::Base32 => encoded_len * 5 / 8,
        }
    }

    /// Encode bytes to text. Never fails.
    pub fn encode(&self, data: &[u8]) -> String {
        match self {
            Codec::Hex => hex::encode(data),
            Codec::Base32 => BASE32_NOPAD.encode(data).to_ascii_lowercase(),
        }
    }

    /// Decode text back to bytes, validating the charset first
    pub fn decode(&self, text: &str) -> Result<Vec<u8>, TunnelError> {
        match self {
            Codec::Hex => decode_hex(text),
            Codec::Base32 => decode_base32(text),
        }
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, TunnelError> {
    if !text.bytes().all(|b| matches!(b, b'a'..=b'f' | b'0'..=b'9')) {
        return Err(TunnelError::Encoding(format!("Data isn't hex encoded: {}", text)));
    }
    if text.len() % 2 != 0 {
        return Err(TunnelError::Encoding(
            "Data isn't proper hex (it should have an even number of characters)".into(),
        ));
    }

    hex::decode(text).map_err(|e| TunnelError::Encoding(format!("Illegal hex string: {}", e)))
}

fn decode_base32(text: &str) -> Result<Vec<u8>, TunnelError> {
    let mut upper = text.to_ascii_uppercase();
    if !upper.bytes().all(|b| matches!(b, b'A'..=b'Z' | b'2'..=b'7')) {
        return Err(TunnelError::Encoding(format!("Data isn't base32 encoded: {}", text)));
    }

    // Re-pad to a multiple of 8 so the strict decoder accepts it
    let padding = (8 - upper.len() % 8) % 8;
    upper.extend(std::iter::repeat('=').take(padding));

    BASE32
        .decode(upper.as_bytes())
        .map_err(|e| TunnelError::Encoding(format!("Illegal base32 string: {}", e)))
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for Codec {
    type Error = TunnelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<Codec> for String {
    fn from(codec: Codec) -> Self {
        codec.name().to_string()
    }
}
