use super::traits::{unsupported, AdapterCapabilities, AdapterError, SourceAdapter};
use super::{clean_text, ARXIV};
use crate::client::{non_empty, send_text, RawRecord};
use crate::identity::{normalize_doi, Identifier, IdentifierKind};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";
/// DataCite prefix arXiv registers its own DOIs under
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

/// arXiv Atom API adapter
pub struct ArxivAdapter {
    client: Client,
    base_url: String,
}

impl ArxivAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Vec<RawRecord>, AdapterError> {
        let body = send_text(self.client.get(&self.base_url).query(params)).await?;
        parse_feed(&body)
    }

    /// arXiv id behind an identifier, if it has one
    fn arxiv_id(id: &Identifier) -> Option<String> {
        match id.kind {
            IdentifierKind::ArxivId => Some(id.value.clone()),
            IdentifierKind::Doi => id
                .value
                .to_ascii_lowercase()
                .strip_prefix(ARXIV_DOI_PREFIX)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Parse an arXiv Atom feed
fn parse_feed(xml: &str) -> Result<Vec<RawRecord>, AdapterError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| AdapterError::Malformed(format!("arXiv feed: {e}")))?;

    let mut records = Vec::new();
    for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
        let mut record = RawRecord::new(ARXIV);
        let mut explicit_doi = None;

        for child in entry.children().filter(roxmltree::Node::is_element) {
            match child.tag_name().name() {
                "id" => {
                    let Some(url) = child.text() else { continue };
                    // the API reports query errors as a pseudo-entry
                    if url.contains("/api/errors") {
                        return Err(AdapterError::Client {
                            status: 400,
                            message: entry_summary(entry).unwrap_or_else(|| url.to_string()),
                        });
                    }
                    record.url = Some(url.trim().to_string());
                    record.arxiv_id = url
                        .trim()
                        .split_once("/abs/")
                        .map(|(_, id)| strip_version(id).to_string());
                }
                "title" => record.title = non_empty(child.text().map(clean_text)),
                "summary" => record.abstract_text = non_empty(child.text().map(clean_text)),
                "published" => {
                    record.publication_date = child
                        .text()
                        .map(str::trim)
                        .filter(|d| d.len() >= 10)
                        .map(|d| d[..10].to_string());
                }
                "author" => {
                    let name = child
                        .children()
                        .find(|n| n.has_tag_name("name"))
                        .and_then(|n| n.text())
                        .map(clean_text);
                    if let Some(name) = non_empty(name) {
                        record.authors.push(name);
                    }
                }
                "doi" => explicit_doi = child.text().and_then(normalize_doi),
                "journal_ref" => record.journal = non_empty(child.text().map(clean_text)),
                _ => {}
            }
        }

        record.doi = explicit_doi.or_else(|| {
            record
                .arxiv_id
                .as_ref()
                .map(|id| format!("{ARXIV_DOI_PREFIX}{}", id.to_ascii_lowercase()))
        });

        if record.title.is_some() {
            records.push(record);
        }
    }

    debug!("Parsed {} entries from arXiv feed", records.len());
    Ok(records)
}

fn entry_summary(entry: roxmltree::Node<'_, '_>) -> Option<String> {
    entry
        .children()
        .find(|n| n.has_tag_name("summary"))
        .and_then(|n| n.text())
        .map(clean_text)
}

/// `2301.00001v2` -> `2301.00001`
fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos) if pos + 1 < id.len() && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &id[..pos]
        }
        _ => id,
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &str {
        ARXIV
    }

    fn description(&self) -> &str {
        "arXiv - open-access preprints in physics, mathematics and computer science"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            search: true,
            details: vec![IdentifierKind::ArxivId],
            references: Vec::new(),
            citing: Vec::new(),
            similar: Vec::new(),
            converts_identifiers: true,
        }
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        let max = max_results.to_string();
        let records = self
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max.as_str()),
            ])
            .await?;

        info!("arXiv search returned {} records", records.len());
        Ok(records.into_iter().take(max_results as usize).collect())
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        if id.kind != IdentifierKind::ArxivId {
            return Err(unsupported(ARXIV, "details", id));
        }
        self.query(&[("id_list", id.value.as_str())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::NotFound(format!("{id} not on arXiv")))
    }

    /// arXiv DOIs are derived from the arXiv id, so conversion is local
    async fn convert_identifier(
        &self,
        id: &Identifier,
        target: IdentifierKind,
    ) -> Result<Option<Identifier>, AdapterError> {
        let Some(arxiv_id) = Self::arxiv_id(id) else {
            return Err(unsupported(ARXIV, "identifier conversion", id));
        };
        Ok(match target {
            IdentifierKind::ArxivId => Some(Identifier::new(target, strip_version(&arxiv_id))),
            IdentifierKind::Doi => Some(Identifier::new(
                target,
                format!("{ARXIV_DOI_PREFIX}{}", strip_version(&arxiv_id).to_ascii_lowercase()),
            )),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models...</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:journal_ref>NeurIPS 2017</arxiv:journal_ref>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>Old style</title>
    <arxiv:doi>10.1016/S0370-2693(99)00001-X</arxiv:doi>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let records = parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let attention = &records[0];
        assert_eq!(attention.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(attention.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(attention.publication_date.as_deref(), Some("2017-06-12"));
        assert_eq!(attention.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(attention.journal.as_deref(), Some("NeurIPS 2017"));
        assert_eq!(attention.doi.as_deref(), Some("10.48550/arxiv.1706.03762"));

        let legacy = &records[1];
        assert_eq!(legacy.arxiv_id.as_deref(), Some("hep-th/9901001"));
        assert_eq!(legacy.doi.as_deref(), Some("10.1016/s0370-2693(99)00001-x"));
    }

    #[test]
    fn test_error_entry() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
            <title>Error</title><summary>incorrect id format for 1234</summary>
        </entry></feed>"#;
        assert!(matches!(
            parse_feed(feed),
            Err(AdapterError::Client { status: 400, .. })
        ));
    }

    #[test]
    fn test_malformed_feed() {
        assert!(matches!(parse_feed("<feed"), Err(AdapterError::Malformed(_))));
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("2301.00001v12"), "2301.00001");
        assert_eq!(strip_version("2301.00001"), "2301.00001");
        assert_eq!(strip_version("hep-th/9901001v1"), "hep-th/9901001");
        assert_eq!(strip_version("solv-int/9901001"), "solv-int/9901001");
    }

    #[tokio::test]
    async fn test_local_conversion() {
        let adapter = ArxivAdapter::new(Client::new());
        let id = Identifier::new(IdentifierKind::ArxivId, "1706.03762v7");
        let doi = adapter
            .convert_identifier(&id, IdentifierKind::Doi)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doi.value, "10.48550/arxiv.1706.03762");

        let back = adapter
            .convert_identifier(&doi, IdentifierKind::ArxivId)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.value, "1706.03762");
        assert!(adapter
            .convert_identifier(&id, IdentifierKind::Pmid)
            .await
            .unwrap()
            .is_none());
    }
}
