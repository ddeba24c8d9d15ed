use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Hex-encoded SHA-256 request fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds namespaced fingerprints from named request fields.
///
/// Fields are keyed by name and hashed in name order, so the order in which
/// callers add them is irrelevant. Set-valued fields are normalized, sorted
/// and de-duplicated before hashing.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    namespace: String,
    fields: BTreeMap<String, String>,
}

impl FingerprintBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field verbatim
    #[must_use]
    pub fn field(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    /// Add free text, case-folded with whitespace collapsed
    #[must_use]
    pub fn text(self, name: &str, value: &str) -> Self {
        let normalized = normalize_text(value);
        self.field(name, normalized)
    }

    /// Add an unordered set of values
    #[must_use]
    pub fn set<I, S>(self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members: BTreeSet<String> = values
            .into_iter()
            .map(|v| normalize_text(v.as_ref()))
            .filter(|v| !v.is_empty())
            .collect();
        let joined = members.into_iter().collect::<Vec<_>>().join(",");
        self.field(name, joined)
    }

    #[must_use]
    pub fn finish(self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"\n");
        // length-prefixed so no field value can collide with a separator
        for (name, value) in &self.fields {
            hasher.update(format!("{}:{}={}:{}\n", name.len(), name, value.len(), value).as_bytes());
        }

        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Fingerprint(hex)
    }
}

fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_order_irrelevant() {
        let a = FingerprintBuilder::new("search")
            .text("keyword", "CRISPR  Cas9")
            .set("sources", ["pubmed", "crossref"])
            .field("max_results", 10)
            .finish();
        let b = FingerprintBuilder::new("search")
            .field("max_results", 10)
            .set("sources", ["crossref", "pubmed", "crossref"])
            .text("keyword", " crispr cas9 ")
            .finish();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_namespaces_distinct() {
        let search = FingerprintBuilder::new("search").text("keyword", "x").finish();
        let details = FingerprintBuilder::new("details").text("keyword", "x").finish();
        assert_ne!(search, details);
    }

    #[test]
    fn test_values_matter() {
        let ten = FingerprintBuilder::new("search").field("max_results", 10).finish();
        let twenty = FingerprintBuilder::new("search").field("max_results", 20).finish();
        assert_ne!(ten, twenty);
    }

    #[test]
    fn test_no_separator_collision() {
        let a = FingerprintBuilder::new("ns").field("a", "1\n1:b=1:2").finish();
        let b = FingerprintBuilder::new("ns").field("a", "1").field("b", "2").finish();
        assert_ne!(a, b);
    }
}
