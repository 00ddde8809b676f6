// Routing table: which sink owns which tag or domain

use crate::builders::MAX_RR_LENGTH;
use crate::codec::Codec;
use crate::name_budget::{NameBudget, DEFAULT_MAX_SUBDOMAIN_LENGTH};
use crate::reader;
use crate::sink::SinkHandle;
use crate::TunnelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an affix is matched at the front or the back of a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// `tag.<payload>`
    Tag,
    /// `<payload>.domain`
    Domain,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Tag => write!(f, "tag"),
            RouteKind::Domain => write!(f, "domain"),
        }
    }
}

/// Per-route encoding settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOptions {
    pub codec: Codec,
    pub max_subdomain_length: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            codec: Codec::Hex,
            max_subdomain_length: DEFAULT_MAX_SUBDOMAIN_LENGTH,
        }
    }
}

impl RouteOptions {
    pub fn with_codec(codec: Codec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TunnelError> {
        NameBudget::new(None, None, self.max_subdomain_length, self.codec).map(|_| ())
    }
}

#[derive(Clone)]
pub struct SinkEntry {
    pub affix: String,
    pub options: RouteOptions,
    pub sink: SinkHandle,
}

impl fmt::Debug for SinkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkEntry")
            .field("affix", &self.affix)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A question name that belongs to one of our routes
#[derive(Debug)]
pub struct RouteMatch {
    pub kind: RouteKind,
    pub entry: SinkEntry,
    pub payload: Vec<u8>,
}

impl RouteMatch {
    /// Name budget for replies on this route
    pub fn budget(&self) -> Result<NameBudget, TunnelError> {
        let affix = Some(self.entry.affix.clone());
        let (tag, domain) = match self.kind {
            RouteKind::Tag => (affix, None),
            RouteKind::Domain => (None, affix),
        };
        NameBudget::new(tag, domain, self.entry.options.max_subdomain_length, self.entry.options.codec)
    }
}

#[derive(Debug, Default)]
pub struct RouteTable {
    tags: Vec<SinkEntry>,
    domains: Vec<SinkEntry>,
}

/// Trailing dots are dropped; `test.com.` and `test.com` are one domain
fn normalize(affix: &str) -> String {
    affix.trim_end_matches('.').to_string()
}

/// Longest single label in a name
const MAX_LABEL_LENGTH: usize = 63;

/// An affix has to be a usable DNS name on its own
pub(crate) fn check_affix(kind: RouteKind, affix: &str) -> Result<(), TunnelError> {
    if affix.is_empty() {
        return Err(TunnelError::Config(format!("A {} can't be empty", kind)));
    }
    if affix.len() > MAX_RR_LENGTH {
        return Err(TunnelError::Config(format!(
            "The {} '{}' is {} bytes long (max: {})",
            kind,
            affix,
            affix.len(),
            MAX_RR_LENGTH
        )));
    }
    if let Some(label) = affix
        .split('.')
        .find(|label| label.is_empty() || label.len() > MAX_LABEL_LENGTH)
    {
        return Err(TunnelError::Config(format!(
            "The {} '{}' has a bad label '{}' (labels are 1-{} bytes)",
            kind, affix, label, MAX_LABEL_LENGTH
        )));
    }
    Ok(())
}

/// Two affixes of the same kind conflict when a name could match both
fn conflicts(kind: RouteKind, a: &str, b: &str) -> bool {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    if a == b {
        return true;
    }

    match kind {
        RouteKind::Domain => a.ends_with(&format!(".{}", b)) || b.ends_with(&format!(".{}", a)),
        RouteKind::Tag => a.starts_with(&format!("{}.", b)) || b.starts_with(&format!("{}.", a)),
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, kind: RouteKind) -> &Vec<SinkEntry> {
        match kind {
            RouteKind::Tag => &self.tags,
            RouteKind::Domain => &self.domains,
        }
    }

    fn entries_mut(&mut self, kind: RouteKind) -> &mut Vec<SinkEntry> {
        match kind {
            RouteKind::Tag => &mut self.tags,
            RouteKind::Domain => &mut self.domains,
        }
    }

    pub fn insert(
        &mut self,
        kind: RouteKind,
        affix: &str,
        sink: SinkHandle,
        options: RouteOptions,
    ) -> Result<(), TunnelError> {
        let affix = normalize(affix);
        check_affix(kind, &affix)?;
        options.validate()?;

        if let Some(existing) = self
            .entries(kind)
            .iter()
            .find(|entry| conflicts(kind, &affix, &entry.affix))
        {
            return Err(TunnelError::ConflictingRoute {
                kind,
                new: affix,
                existing: existing.affix.clone(),
            });
        }

        self.entries_mut(kind).push(SinkEntry {
            affix,
            options,
            sink,
        });
        Ok(())
    }

    /// Returns whether anything was removed
    pub fn remove(&mut self, kind: RouteKind, affix: &str) -> bool {
        let affix = normalize(affix);
        let entries = self.entries_mut(kind);
        let before = entries.len();
        entries.retain(|entry| !entry.affix.eq_ignore_ascii_case(&affix));
        entries.len() != before
    }

    pub fn affixes(&self, kind: RouteKind) -> Vec<String> {
        self.entries(kind).iter().map(|entry| entry.affix.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len() + self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the route for `name`: domains first, then tags, each in the order
    /// they were added. The first match wins, even if its payload is bad.
    pub fn lookup(&self, name: &str) -> Result<Option<RouteMatch>, TunnelError> {
        for kind in [RouteKind::Domain, RouteKind::Tag] {
            for entry in self.entries(kind) {
                if let Some(payload) = reader::try_affix(kind, name, &entry.affix, entry.options.codec)? {
                    return Ok(Some(RouteMatch {
                        kind,
                        entry: entry.clone(),
                        payload,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use std::sync::Arc;

    fn sink(reply: &'static [u8]) -> SinkHandle {
        Arc::new(move |_data: &[u8], _max_length: usize| -> Result<Option<Vec<u8>>, SinkError> {
            Ok(Some(reply.to_vec()))
        })
    }

    fn hex() -> RouteOptions {
        RouteOptions::default()
    }

    #[test]
    fn test_conflicts() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Domain, "test.com", sink(b""), hex()).unwrap();
        table.insert(RouteKind::Tag, "abc.123", sink(b""), hex()).unwrap();

        for domain in ["sub.test.com", "com", "test.com", "TEST.com"] {
            assert!(matches!(
                table.insert(RouteKind::Domain, domain, sink(b""), hex()),
                Err(TunnelError::ConflictingRoute { kind: RouteKind::Domain, .. })
            ));
        }
        table.insert(RouteKind::Domain, "123test.com", sink(b""), hex()).unwrap();

        for tag in ["abc", "abc.123.super", "abc.123"] {
            assert!(matches!(
                table.insert(RouteKind::Tag, tag, sink(b""), hex()),
                Err(TunnelError::ConflictingRoute { kind: RouteKind::Tag, .. })
            ));
        }
        table.insert(RouteKind::Domain, "abc.123hi", sink(b""), hex()).unwrap();
        table.insert(RouteKind::Tag, "abc123", sink(b""), hex()).unwrap();

        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_conflict_error_names_both_sides() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Domain, "test.com", sink(b""), hex()).unwrap();
        let err = table
            .insert(RouteKind::Domain, "a.test.com", sink(b""), hex())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The domain 'a.test.com' conflicts with the existing domain 'test.com'"
        );
    }

    #[test]
    fn test_tags_and_domains_dont_conflict_with_each_other() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Domain, "abc", sink(b""), hex()).unwrap();
        table.insert(RouteKind::Tag, "abc", sink(b""), hex()).unwrap();
    }

    #[test]
    fn test_remove() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Domain, "test.com", sink(b""), hex()).unwrap();
        assert!(!table.remove(RouteKind::Tag, "test.com"));
        assert!(table.remove(RouteKind::Domain, "Test.Com."));
        assert!(table.is_empty());
        assert!(!table.remove(RouteKind::Domain, "test.com"));

        table.insert(RouteKind::Domain, "test.com", sink(b""), hex()).unwrap();
        assert_eq!(table.affixes(RouteKind::Domain), vec!["test.com"]);
    }

    #[test]
    fn test_lookup_order() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Tag, "abc", sink(b"tag"), hex()).unwrap();
        table.insert(RouteKind::Domain, "test.com", sink(b"domain"), hex()).unwrap();

        // Matches both; the domain wins even though the tag came first
        let matched = table.lookup("abc.4.test.com").unwrap().unwrap();
        assert_eq!(matched.kind, RouteKind::Domain);
        assert_eq!(matched.payload, vec![0xab, 0xc4]);
    }

    #[test]
    fn test_lookup() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Domain, "test.com", sink(b""), hex()).unwrap();
        table.insert(RouteKind::Tag, "abc", sink(b""), RouteOptions::with_codec(Codec::Base32)).unwrap();

        let matched = table.lookup("41414141.test.com").unwrap().unwrap();
        assert_eq!(matched.kind, RouteKind::Domain);
        assert_eq!(matched.payload, b"AAAA");

        let matched = table.lookup("abc.gmztgmy").unwrap().unwrap();
        assert_eq!(matched.kind, RouteKind::Tag);
        assert_eq!(matched.payload, b"3333");

        assert!(table.lookup("example.org").unwrap().is_none());
        assert!(table.lookup("zz.test.com").is_err());
    }

    #[test]
    fn test_match_budget() {
        let mut table = RouteTable::new();
        table.insert(RouteKind::Tag, "abc", sink(b""), hex()).unwrap();
        let budget = table.lookup("abc").unwrap().unwrap().budget().unwrap();
        assert_eq!(budget.tag(), Some("abc"));
        assert_eq!(budget.domain(), None);
        assert_eq!(budget.max_length(), 122);
    }

    #[test]
    fn test_bad_options_rejected() {
        let mut table = RouteTable::new();
        let options = RouteOptions {
            codec: Codec::Hex,
            max_subdomain_length: 0,
        };
        assert!(matches!(
            table.insert(RouteKind::Tag, "abc", sink(b""), options),
            Err(TunnelError::Config(_))
        ));
        assert!(table.insert(RouteKind::Tag, "", sink(b""), hex()).is_err());
    }

    #[test]
    fn test_unusable_affixes_rejected() {
        let mut table = RouteTable::new();
        let long_label = format!("{}.com", "a".repeat(64));
        let long_name = vec!["a".repeat(60); 5].join(".");

        for affix in [long_label.as_str(), long_name.as_str(), "a..com", ".com"] {
            for kind in [RouteKind::Tag, RouteKind::Domain] {
                assert!(
                    matches!(table.insert(kind, affix, sink(b""), hex()), Err(TunnelError::Config(_))),
                    "{} {}",
                    kind,
                    affix
                );
            }
        }
        assert!(table.is_empty());

        table
            .insert(RouteKind::Domain, &format!("{}.com", "a".repeat(63)), sink(b""), hex())
            .unwrap();
    }
}
