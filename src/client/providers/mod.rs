pub mod arxiv;
pub mod crossref;
pub mod easyscholar;
pub mod europe_pmc;
pub mod openalex;
pub mod pubmed;
pub mod traits;

pub use arxiv::ArxivAdapter;
pub use crossref::CrossrefAdapter;
pub use easyscholar::EasyScholarProvider;
pub use europe_pmc::EuropePmcAdapter;
pub use openalex::OpenAlexAdapter;
pub use pubmed::PubMedAdapter;
pub use traits::{
    AdapterCapabilities, AdapterError, ErrorKind, IdOperation, QualityProvider, SourceAdapter,
    SourceFailure,
};

pub const EUROPE_PMC: &str = "europe_pmc";
pub const PUBMED: &str = "pubmed";
pub const CROSSREF: &str = "crossref";
pub const OPENALEX: &str = "openalex";
pub const ARXIV: &str = "arxiv";
pub const EASYSCHOLAR: &str = "easyscholar";

use serde::{Deserialize, Deserializer};

/// Providers are inconsistent about whether years, counts and scores are JSON
/// strings or numbers; accept either and keep the text form.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Split a comma-separated author string (`"Doudna JA, Charpentier E."`)
pub(crate) fn split_author_string(authors: &str) -> Vec<String> {
    authors
        .split(',')
        .map(|a| a.trim().trim_end_matches('.').trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Collapse internal whitespace/newlines in provider text
pub(crate) fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "string_or_number")]
        year: Option<String>,
    }

    #[test]
    fn test_string_or_number() {
        let n: Probe = serde_json::from_str(r#"{"year": 2014}"#).unwrap();
        let s: Probe = serde_json::from_str(r#"{"year": "2014"}"#).unwrap();
        let missing: Probe = serde_json::from_str("{}").unwrap();
        let null: Probe = serde_json::from_str(r#"{"year": null}"#).unwrap();
        assert_eq!(n.year.as_deref(), Some("2014"));
        assert_eq!(s.year.as_deref(), Some("2014"));
        assert_eq!(missing.year, None);
        assert_eq!(null.year, None);
    }

    #[test]
    fn test_split_author_string() {
        assert_eq!(
            split_author_string("Doudna JA, Charpentier E."),
            vec!["Doudna JA", "Charpentier E"]
        );
        assert!(split_author_string(" , ").is_empty());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Deep\n   learning  "), "Deep learning");
    }
}
