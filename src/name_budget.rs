//! How much payload fits in a DNS name
//!
//! Used by the CNAME, MX and NS builders. A name on the wire is at most 254
//! bytes including the trailing NUL; the affix (tag or domain plus its dot)
//! and one dot per `max_subdomain_length` characters of encoded data come out
//! of that, one more byte is held back, and whatever is left is converted to
//! raw bytes through the codec's ratio.

use crate::builders::MAX_NAME_LENGTH;
use crate::codec::Codec;
use crate::TunnelError;

/// Longest label DNS allows, and the default segment length
pub const DEFAULT_MAX_SUBDOMAIN_LENGTH: usize = 63;

/// Bytes kept back from `MAX_NAME_LENGTH`: the trailing NUL and one spare
const RESERVED_BYTES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBudget {
    tag: Option<String>,
    domain: Option<String>,
    max_subdomain_length: usize,
    codec: Codec,
}

impl NameBudget {
    pub fn new(
        tag: Option<String>,
        domain: Option<String>,
        max_subdomain_length: usize,
        codec: Codec,
    ) -> Result<Self, TunnelError> {
        if !(1..=DEFAULT_MAX_SUBDOMAIN_LENGTH).contains(&max_subdomain_length) {
            return Err(TunnelError::Config(format!(
                "max_subdomain_length must be between 1 and {} (got {})",
                DEFAULT_MAX_SUBDOMAIN_LENGTH, max_subdomain_length
            )));
        }

        Ok(Self {
            tag,
            domain,
            max_subdomain_length,
            codec,
        })
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn max_subdomain_length(&self) -> usize {
        self.max_subdomain_length
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Affix bytes, each with its separating dot
    fn affix_length(&self) -> usize {
        let tag = self.tag.as_ref().map_or(0, |t| t.len() + 1);
        let domain = self.domain.as_ref().map_or(0, |d| d.len() + 1);
        tag + domain
    }

    /// Most encoded characters that fit once the segment dots are counted.
    ///
    /// `n` characters need `ceil(n / L) - 1` dots, so `n + ceil(n / L)` must
    /// stay within the space left plus one. Every full segment costs `L + 1`;
    /// a partial one costs its characters plus a dot.
    pub fn max_encoded_length(&self) -> usize {
        let available = MAX_NAME_LENGTH
            .saturating_sub(RESERVED_BYTES)
            .saturating_sub(self.affix_length());
        let budget = available + 1;
        let segment = self.max_subdomain_length + 1;

        let full = budget / segment;
        let partial = (budget % segment).saturating_sub(1);

        full * self.max_subdomain_length + partial
    }

    /// Largest raw payload `encode_name` accepts
    pub fn max_length(&self) -> usize {
        self.codec.max_decoded_len(self.max_encoded_length())
    }

    /// Encode `data`, split it into segments and attach the affixes
    pub fn encode_name(&self, data: &[u8]) -> Result<String, TunnelError> {
        let max = self.max_length();
        if data.len() > max {
            return Err(TunnelError::PayloadTooLarge {
                length: data.len(),
                max,
            });
        }

        let encoded = self.codec.encode(data);

        let mut parts: Vec<&str> = Vec::new();
        if let Some(tag) = self.tag.as_deref() {
            parts.push(tag);
        }
        // The encoded text is ASCII, so byte chunks are char boundaries
        parts.extend(
            encoded
                .as_bytes()
                .chunks(self.max_subdomain_length)
                .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
        );
        if let Some(domain) = self.domain.as_deref() {
            parts.push(domain);
        }

        Ok(parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("."))
    }
}
