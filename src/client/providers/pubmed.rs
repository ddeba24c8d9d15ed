use super::traits::{unsupported, AdapterCapabilities, AdapterError, SourceAdapter};
use super::{clean_text, string_or_number, PUBMED};
use crate::client::{non_empty, send_json, send_text, RawRecord};
use crate::identity::{Identifier, IdentifierKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DEFAULT_IDCONV_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/";
const TOOL_NAME: &str = "research-aggregator";

/// NCBI E-utilities adapter: PubMed search and summaries, elink relations
/// (references, cited-by, similar) and the PMC ID converter.
pub struct PubMedAdapter {
    client: Client,
    base_url: String,
    idconv_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    result: Option<SummaryResult>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(default)]
    uids: Vec<String>,
    #[serde(flatten)]
    documents: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    uid: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<SummaryAuthor>,
    fulljournalname: Option<String>,
    source: Option<String>,
    pubdate: Option<String>,
    sortpubdate: Option<String>,
    #[serde(default)]
    articleids: Vec<ArticleId>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    idtype: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct LinkEnvelope {
    #[serde(default)]
    linksets: Vec<LinkSet>,
}

#[derive(Debug, Deserialize)]
struct LinkSet {
    #[serde(default)]
    linksetdbs: Vec<LinkSetDb>,
}

#[derive(Debug, Deserialize)]
struct LinkSetDb {
    linkname: String,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IdConvEnvelope {
    #[serde(default)]
    records: Vec<IdConvRecord>,
}

#[derive(Debug, Deserialize)]
struct IdConvRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    errmsg: Option<String>,
}

impl PubMedAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            idconv_url: DEFAULT_IDCONV_URL.to_string(),
            api_key: None,
            email: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_idconv_url(mut self, idconv_url: impl Into<String>) -> Self {
        self.idconv_url = idconv_url.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// GET an E-utilities endpoint with the identification parameters NCBI asks for
    fn eutils(&self, endpoint: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, endpoint);
        self.identify(self.client.get(url))
    }

    fn identify(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.query(&[("tool", TOOL_NAME)]);
        if let Some(email) = &self.email {
            request = request.query(&[("email", email)]);
        }
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("api_key", api_key)]);
        }
        request
    }

    fn require_pmid<'a>(id: &'a Identifier, operation: &str) -> Result<&'a str, AdapterError> {
        if id.kind == IdentifierKind::Pmid {
            Ok(&id.value)
        } else {
            Err(unsupported(PUBMED, operation, id))
        }
    }

    /// esummary for a batch of pmids, in the order given
    async fn summaries(&self, pmids: &[String]) -> Result<Vec<RawRecord>, AdapterError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = pmids.join(",");
        let envelope: SummaryEnvelope = send_json(
            self.eutils("esummary.fcgi")
                .query(&[("db", "pubmed"), ("retmode", "json"), ("id", ids.as_str())]),
        )
        .await?;

        let Some(mut result) = envelope.result else {
            return Ok(Vec::new());
        };

        let order = if result.uids.is_empty() {
            pmids.to_vec()
        } else {
            result.uids.clone()
        };

        let mut records = Vec::new();
        for uid in order {
            let Some(document) = result.documents.remove(&uid) else {
                continue;
            };
            let summary: Summary = serde_json::from_value(document)
                .map_err(|e| AdapterError::Malformed(format!("esummary {uid}: {e}")))?;
            if summary.error.is_some() {
                debug!("esummary skipped {}: {:?}", uid, summary.error);
                continue;
            }
            records.push(Self::to_record(summary, &uid));
        }
        Ok(records)
    }

    /// Pmids linked to `pmid` under an elink link name
    async fn linked_ids(
        &self,
        pmid: &str,
        linkname: &str,
        max_results: u32,
    ) -> Result<Vec<String>, AdapterError> {
        let envelope: LinkEnvelope = send_json(self.eutils("elink.fcgi").query(&[
            ("dbfrom", "pubmed"),
            ("db", "pubmed"),
            ("retmode", "json"),
            ("id", pmid),
            ("linkname", linkname),
        ]))
        .await?;

        let ids: Vec<String> = envelope
            .linksets
            .into_iter()
            .flat_map(|set| set.linksetdbs)
            .filter(|db| db.linkname == linkname)
            .flat_map(|db| db.links)
            .filter(|id| id != pmid)
            .take(max_results as usize)
            .collect();

        debug!("elink {} for {} returned {} ids", linkname, pmid, ids.len());
        Ok(ids)
    }

    async fn related(
        &self,
        id: &Identifier,
        linkname: &str,
        operation: &str,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let pmid = Self::require_pmid(id, operation)?;
        let ids = self.linked_ids(pmid, linkname, max_results).await?;
        self.summaries(&ids).await
    }

    /// Abstract text via efetch XML; only the summary endpoint is required,
    /// so a failure here leaves the abstract empty
    async fn fetch_abstract(&self, pmid: &str) -> Option<String> {
        let request = self
            .eutils("efetch.fcgi")
            .query(&[("db", "pubmed"), ("retmode", "xml"), ("id", pmid)]);
        match send_text(request).await {
            Ok(xml) => parse_abstract(&xml),
            Err(e) => {
                debug!("efetch abstract for {} failed: {}", pmid, e);
                None
            }
        }
    }

    fn to_record(summary: Summary, uid: &str) -> RawRecord {
        let mut record = RawRecord::new(PUBMED);
        let pmid = summary.uid.unwrap_or_else(|| uid.to_string());

        for article_id in summary.articleids {
            match article_id.idtype.as_str() {
                "doi" => record.doi = non_empty(Some(article_id.value)),
                "pmc" | "pmcid" if article_id.value.to_ascii_uppercase().starts_with("PMC") => {
                    record.pmcid = non_empty(Some(article_id.value));
                }
                _ => {}
            }
        }

        record.title = non_empty(summary.title.as_deref().map(clean_text));
        record.authors = summary
            .authors
            .into_iter()
            .filter_map(|a| non_empty(a.name))
            .collect();
        record.journal = non_empty(summary.fulljournalname).or_else(|| non_empty(summary.source));
        record.publication_date = summary
            .sortpubdate
            .as_deref()
            .and_then(parse_sort_date)
            .or_else(|| summary.pubdate.as_deref().and_then(parse_pub_year));
        record.url = Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"));
        record.pmid = Some(pmid);
        record
    }
}

/// `2014/11/28 00:00` -> `2014-11-28`
fn parse_sort_date(value: &str) -> Option<String> {
    let date = value.split_whitespace().next()?.replace('/', "-");
    let valid = date.len() == 10
        && date
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    valid.then_some(date)
}

/// `2014 Nov 28` -> `2014`
fn parse_pub_year(value: &str) -> Option<String> {
    let year = value.split_whitespace().next()?;
    (year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())).then(|| year.to_string())
}

fn parse_abstract(xml: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let sections: Vec<String> = doc
        .descendants()
        .filter(|n| n.has_tag_name("AbstractText"))
        .map(|node| {
            let text: String = node
                .descendants()
                .filter(roxmltree::Node::is_text)
                .filter_map(|t| t.text())
                .collect();
            let text = clean_text(&text);
            match node.attribute("Label") {
                Some(label) if !text.is_empty() => format!("{label}: {text}"),
                _ => text,
            }
        })
        .filter(|s| !s.is_empty())
        .collect();

    if sections.is_empty() {
        None
    } else {
        Some(sections.join(" "))
    }
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn name(&self) -> &str {
        PUBMED
    }

    fn description(&self) -> &str {
        "PubMed via NCBI E-utilities - biomedical citations with reference, cited-by and similar-article links"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            search: true,
            details: vec![IdentifierKind::Pmid],
            references: vec![IdentifierKind::Pmid],
            citing: vec![IdentifierKind::Pmid],
            similar: vec![IdentifierKind::Pmid],
            converts_identifiers: true,
        }
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        let retmax = max_results.to_string();
        let envelope: SearchEnvelope = send_json(self.eutils("esearch.fcgi").query(&[
            ("db", "pubmed"),
            ("retmode", "json"),
            ("term", query),
            ("retmax", retmax.as_str()),
        ]))
        .await?;

        let records = self.summaries(&envelope.esearchresult.idlist).await?;
        info!("PubMed search returned {} records", records.len());
        Ok(records)
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        let pmid = Self::require_pmid(id, "details")?;
        let mut record = self
            .summaries(&[pmid.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::NotFound(format!("{id} not in PubMed")))?;

        record.abstract_text = self.fetch_abstract(pmid).await;
        Ok(record)
    }

    async fn fetch_references(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.related(id, "pubmed_pubmed_refs", "references", max_results)
            .await
    }

    async fn fetch_citing(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.related(id, "pubmed_pubmed_citedin", "citing articles", max_results)
            .await
    }

    async fn fetch_similar(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.related(id, "pubmed_pubmed", "similar articles", max_results)
            .await
    }

    async fn convert_identifier(
        &self,
        id: &Identifier,
        target: IdentifierKind,
    ) -> Result<Option<Identifier>, AdapterError> {
        if !matches!(
            id.kind,
            IdentifierKind::Doi | IdentifierKind::Pmid | IdentifierKind::Pmcid
        ) {
            return Err(unsupported(PUBMED, "identifier conversion", id));
        }

        let request = self
            .identify(self.client.get(&self.idconv_url))
            .query(&[("ids", id.value.as_str()), ("format", "json")]);
        let envelope: IdConvEnvelope = send_json(request).await?;

        let Some(record) = envelope.records.into_iter().next() else {
            return Err(AdapterError::NotFound(format!("{id} unknown to the ID converter")));
        };
        if let Some(message) = record.errmsg {
            return Err(AdapterError::NotFound(format!("{id}: {message}")));
        }

        let value = match target {
            IdentifierKind::Doi => non_empty(record.doi),
            IdentifierKind::Pmid => non_empty(record.pmid),
            IdentifierKind::Pmcid => non_empty(record.pmcid),
            IdentifierKind::ArxivId | IdentifierKind::Unknown => None,
        };
        Ok(value.map(|v| Identifier::new(target, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_to_record() {
        let body = r#"{"result": {"uids": ["25430774"], "25430774": {
            "uid": "25430774",
            "title": "The new frontier of genome engineering with CRISPR-Cas9.",
            "authors": [{"name": "Doudna JA"}, {"name": "Charpentier E"}],
            "source": "Science",
            "fulljournalname": "Science (New York, N.Y.)",
            "pubdate": "2014 Nov 28",
            "sortpubdate": "2014/11/28 00:00",
            "articleids": [
                {"idtype": "pubmed", "value": "25430774"},
                {"idtype": "doi", "value": "10.1126/science.1258096"},
                {"idtype": "pmc", "value": "PMC4250029"}
            ]
        }}}"#;

        let mut envelope: SummaryEnvelope = serde_json::from_str(body).unwrap();
        let document = envelope.result.as_mut().unwrap().documents.remove("25430774").unwrap();
        let summary: Summary = serde_json::from_value(document).unwrap();
        let record = PubMedAdapter::to_record(summary, "25430774");

        assert_eq!(record.pmid.as_deref(), Some("25430774"));
        assert_eq!(record.doi.as_deref(), Some("10.1126/science.1258096"));
        assert_eq!(record.pmcid.as_deref(), Some("PMC4250029"));
        assert_eq!(record.publication_date.as_deref(), Some("2014-11-28"));
        assert_eq!(record.journal.as_deref(), Some("Science (New York, N.Y.)"));
        assert_eq!(record.authors.len(), 2);
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_sort_date("2014/11/28 00:00").as_deref(), Some("2014-11-28"));
        assert_eq!(parse_sort_date("garbage"), None);
        assert_eq!(parse_pub_year("2014 Nov 28").as_deref(), Some("2014"));
        assert_eq!(parse_pub_year("Winter"), None);
    }

    #[test]
    fn test_parse_structured_abstract() {
        let xml = r#"<?xml version="1.0"?>
            <PubmedArticleSet><PubmedArticle><MedlineCitation><Article><Abstract>
                <AbstractText Label="BACKGROUND">Genome <i>editing</i> works.</AbstractText>
                <AbstractText Label="RESULTS">It does.</AbstractText>
            </Abstract></Article></MedlineCitation></PubmedArticle></PubmedArticleSet>"#;
        assert_eq!(
            parse_abstract(xml).as_deref(),
            Some("BACKGROUND: Genome editing works. RESULTS: It does.")
        );
        assert_eq!(parse_abstract("<PubmedArticleSet/>"), None);
    }

    #[test]
    fn test_idconv_numeric_pmid() {
        let body = r#"{"status": "ok", "records": [{"pmcid": "PMC3531190", "pmid": 23193287, "doi": "10.1093/nar/gks1195"}]}"#;
        let envelope: IdConvEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.records[0].pmid.as_deref(), Some("23193287"));
    }
}
