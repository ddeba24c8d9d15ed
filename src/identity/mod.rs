//! # Identity
//!
//! Shape-based classification of scholarly identifiers (DOI, PMID, PMCID,
//! arXiv) and cross-provider resolution between them.
//!
//! Classification is the only place identifier shapes are inspected; every
//! downstream component dispatches on [`IdentifierKind`].

pub mod resolver;

pub use resolver::{IdentityResolver, Resolution};

use crate::{Error, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Bare DOI: `10.XXXX/suffix`, nested registrants allowed (`10.1000.10/x`)
#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,9}(?:\.\d+)*/\S+$").expect("DOI regex is valid")
});

#[allow(clippy::expect_used)]
static PMID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,9}$").expect("PMID regex is valid"));

#[allow(clippy::expect_used)]
static PMCID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^pmc\d{1,10}$").expect("PMCID regex is valid"));

/// New-style arXiv id `YYMM.NNNN(N)` with optional version and category prefix
#[allow(clippy::expect_used)]
static ARXIV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z\-]+(?:\.[a-z]{2})?/)?\d{4}\.\d{4,5}(?:v\d+)?$")
        .expect("arXiv regex is valid")
});

/// Old-style arXiv id `archive/YYMMNNN`
#[allow(clippy::expect_used)]
static ARXIV_LEGACY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z\-]+(?:\.[a-z]{2})?/\d{7}(?:v\d+)?$")
        .expect("legacy arXiv regex is valid")
});

const DOI_PREFIXES: [&str; 6] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

const ARXIV_PREFIXES: [&str; 4] = [
    "https://arxiv.org/abs/",
    "http://arxiv.org/abs/",
    "arxiv.org/abs/",
    "arxiv:",
];

/// Kind of scholarly identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Doi,
    Pmid,
    Pmcid,
    ArxivId,
    Unknown,
}

impl IdentifierKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::Pmid => "pmid",
            Self::Pmcid => "pmcid",
            Self::ArxivId => "arxiv_id",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doi" => Ok(Self::Doi),
            "pmid" => Ok(Self::Pmid),
            "pmcid" => Ok(Self::Pmcid),
            "arxiv" | "arxiv_id" => Ok(Self::ArxivId),
            other => Err(Error::invalid_input(
                "id_type",
                format!("unsupported identifier type '{other}'"),
            )),
        }
    }
}

/// Tagged identifier value produced by [`classify`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.kind != IdentifierKind::Unknown
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Classify a raw identifier string by shape.
///
/// Recognised prefixes (`doi:`, doi.org URLs, `PMID:`, `PMCID:`, `arXiv:`,
/// arxiv.org abstract URLs) are stripped before matching. Values are returned
/// in canonical form: DOIs lower-cased, PMCIDs upper-cased.
#[must_use]
pub fn classify(raw: &str) -> Identifier {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some(doi) = normalize_doi(trimmed) {
        if DOI_PATTERN.is_match(&doi) {
            return Identifier::new(IdentifierKind::Doi, doi);
        }
    }

    let pmid = strip_prefix_ci(trimmed, &lower, "pmid:").trim();
    if PMID_PATTERN.is_match(pmid) {
        return Identifier::new(IdentifierKind::Pmid, pmid);
    }

    let pmcid = strip_prefix_ci(trimmed, &lower, "pmcid:").trim();
    if PMCID_PATTERN.is_match(pmcid) {
        return Identifier::new(IdentifierKind::Pmcid, pmcid.to_ascii_uppercase());
    }

    let arxiv = ARXIV_PREFIXES
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map_or(trimmed, |prefix| &trimmed[prefix.len()..])
        .trim();
    if ARXIV_PATTERN.is_match(arxiv) || ARXIV_LEGACY_PATTERN.is_match(arxiv) {
        return Identifier::new(IdentifierKind::ArxivId, arxiv);
    }

    Identifier::new(IdentifierKind::Unknown, trimmed)
}

/// Classify and validate caller input.
///
/// Unknown shapes are rejected rather than guessed. When a type hint is given
/// the classified kind must agree with it.
pub fn parse_identifier(raw: &str, hint: Option<IdentifierKind>) -> Result<Identifier> {
    if raw.trim().is_empty() {
        return Err(Error::invalid_input("identifier", "identifier cannot be empty"));
    }

    let identifier = classify(raw);
    if !identifier.is_known() {
        return Err(Error::invalid_input(
            "identifier",
            format!("'{}' is not a DOI, PMID, PMCID or arXiv id", raw.trim()),
        ));
    }

    match hint {
        Some(expected) if expected != IdentifierKind::Unknown && expected != identifier.kind => {
            Err(Error::invalid_input(
                "id_type",
                format!(
                    "'{}' looks like a {} but {} was requested",
                    raw.trim(),
                    identifier.kind,
                    expected
                ),
            ))
        }
        _ => Ok(identifier),
    }
}

/// Normalize a DOI: strip URL/scheme prefixes and lower-case it.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let stripped = DOI_PREFIXES
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map_or(lower.as_str(), |prefix| &lower[prefix.len()..])
        .trim();

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn strip_prefix_ci<'a>(original: &'a str, lower: &str, prefix: &str) -> &'a str {
    if lower.starts_with(prefix) {
        &original[prefix.len()..]
    } else {
        original
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        assert_eq!(classify("10.1038/nature12373").kind, IdentifierKind::Doi);
        assert_eq!(classify("23903748").kind, IdentifierKind::Pmid);
        assert_eq!(classify("PMC1234567").kind, IdentifierKind::Pmcid);
        assert_eq!(classify("2301.12345").kind, IdentifierKind::ArxivId);
        assert_eq!(classify("not-an-id!!").kind, IdentifierKind::Unknown);
    }

    #[test]
    fn test_prefixed_forms() {
        let doi = classify("https://doi.org/10.1038/Nature12373");
        assert_eq!(doi.kind, IdentifierKind::Doi);
        assert_eq!(doi.value, "10.1038/nature12373");

        assert_eq!(classify("doi:10.1000/xyz").value, "10.1000/xyz");
        assert_eq!(classify("PMID: 23903748").value, "23903748");
        assert_eq!(classify("pmc998877").value, "PMC998877");
        assert_eq!(classify("arXiv:2301.12345v2").value, "2301.12345v2");
        assert_eq!(classify("cs.LG/2301.12345").kind, IdentifierKind::ArxivId);
        assert_eq!(classify("hep-th/9901001").kind, IdentifierKind::ArxivId);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = parse_identifier("not-an-id!!", None).unwrap_err();
        assert_eq!(err.error_type(), "InputError");
        assert!(parse_identifier("   ", None).is_err());
    }

    #[test]
    fn test_parse_hint_mismatch() {
        assert!(parse_identifier("23903748", Some(IdentifierKind::Doi)).is_err());
        assert!(parse_identifier("23903748", Some(IdentifierKind::Pmid)).is_ok());
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi("  HTTP://DX.DOI.ORG/10.1000/ABC "),
            Some("10.1000/abc".to_string())
        );
        assert_eq!(normalize_doi("doi:"), None);
        assert_eq!(normalize_doi(""), None);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("arxiv".parse::<IdentifierKind>().unwrap(), IdentifierKind::ArxivId);
        assert_eq!("PMCID".parse::<IdentifierKind>().unwrap(), IdentifierKind::Pmcid);
        assert!("isbn".parse::<IdentifierKind>().is_err());
    }
}
