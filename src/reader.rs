//! Pull the payload back out of a question name
//!
//! A name matches a domain when it is the domain, or ends with `.domain`; it
//! matches a tag when it is the tag, or starts with `tag.`. Whatever is left
//! has its dots removed and goes through the route's codec. Matching is
//! case-insensitive.

use crate::codec::Codec;
use crate::driver::RouteKind;
use crate::TunnelError;

/// Decode `name` if it falls under `domain`.
///
/// `Ok(None)` means no match. A match whose payload doesn't decode is an error.
pub fn try_domain(name: &str, domain: &str, codec: Codec) -> Result<Option<Vec<u8>>, TunnelError> {
    let name = name.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    log::trace!("Checking if {} matches the domain {}", name, domain);

    if name == domain {
        return Ok(Some(Vec::new()));
    }

    match name.strip_suffix(domain.as_str()).and_then(|rest| rest.strip_suffix('.')) {
        Some(encoded) => codec.decode(&encoded.replace('.', "")).map(Some),
        None => Ok(None),
    }
}

/// Decode `name` if it carries `tag`; same rules as [`try_domain`] from the front
pub fn try_tag(name: &str, tag: &str, codec: Codec) -> Result<Option<Vec<u8>>, TunnelError> {
    let name = name.to_ascii_lowercase();
    let tag = tag.to_ascii_lowercase();
    log::trace!("Checking if {} matches the tag {}", name, tag);

    if name == tag {
        return Ok(Some(Vec::new()));
    }

    match name.strip_prefix(tag.as_str()).and_then(|rest| rest.strip_prefix('.')) {
        Some(encoded) => codec.decode(&encoded.replace('.', "")).map(Some),
        None => Ok(None),
    }
}

pub fn try_affix(
    kind: RouteKind,
    name: &str,
    affix: &str,
    codec: Codec,
) -> Result<Option<Vec<u8>>, TunnelError> {
    match kind {
        RouteKind::Domain => try_domain(name, affix, codec),
        RouteKind::Tag => try_tag(name, affix, codec),
    }
}
