use super::traits::{unsupported, AdapterCapabilities, AdapterError, SourceAdapter};
use super::{clean_text, split_author_string, string_or_number, EUROPE_PMC};
use crate::client::{non_empty, send_json, RawRecord};
use crate::identity::{Identifier, IdentifierKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

/// Europe PMC REST API adapter (search, details, references, citations and
/// identifier conversion)
pub struct EuropePmcAdapter {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    hit_count: u64,
    result_list: Option<ResultList>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EpmcResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpmcResult {
    id: Option<String>,
    source: Option<String>,
    pmid: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    author_string: Option<String>,
    author_list: Option<AuthorList>,
    journal_info: Option<JournalInfo>,
    journal_title: Option<String>,
    journal_abbreviation: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub_year: Option<String>,
    first_publication_date: Option<String>,
    abstract_text: Option<String>,
    cited_by_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorList {
    #[serde(default)]
    author: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalInfo {
    journal: Option<Journal>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceResponse {
    reference_list: Option<ReferenceList>,
}

#[derive(Debug, Deserialize)]
struct ReferenceList {
    #[serde(default)]
    reference: Vec<EpmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationResponse {
    citation_list: Option<CitationList>,
}

#[derive(Debug, Deserialize)]
struct CitationList {
    #[serde(default)]
    citation: Vec<EpmcResult>,
}

impl EuropePmcAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Europe PMC field-qualified lookup for one identifier
    fn id_query(id: &Identifier) -> Option<String> {
        match id.kind {
            IdentifierKind::Doi => Some(format!("DOI:\"{}\"", id.value)),
            IdentifierKind::Pmid => Some(format!("EXT_ID:{} AND SRC:MED", id.value)),
            IdentifierKind::Pmcid => Some(format!("PMCID:{}", id.value)),
            IdentifierKind::ArxivId | IdentifierKind::Unknown => None,
        }
    }

    async fn run_search(&self, query: &str, page_size: u32) -> Result<Vec<EpmcResult>, AdapterError> {
        let url = format!("{}/search", self.base_url);
        let page_size = page_size.to_string();
        debug!("Europe PMC search: {}", query);

        let response: SearchResponse = send_json(self.client.get(&url).query(&[
            ("query", query),
            ("format", "json"),
            ("resultType", "core"),
            ("pageSize", page_size.as_str()),
        ]))
        .await?;

        debug!("Europe PMC reported {} hits", response.hit_count);
        Ok(response.result_list.unwrap_or_default().result)
    }

    /// Path segment (`MED/123` or `PMC/PMC123`) used by the link endpoints
    fn article_path(id: &Identifier) -> Option<String> {
        match id.kind {
            IdentifierKind::Pmid => Some(format!("MED/{}", id.value)),
            IdentifierKind::Pmcid => Some(format!("PMC/{}", id.value)),
            _ => None,
        }
    }

    fn to_record(result: EpmcResult) -> RawRecord {
        let mut record = RawRecord::new(EUROPE_PMC);

        let mut authors: Vec<String> = result
            .author_list
            .map(|list| list.author.into_iter().filter_map(|a| non_empty(a.full_name)).collect())
            .unwrap_or_default();
        if authors.is_empty() {
            authors = result
                .author_string
                .as_deref()
                .map(split_author_string)
                .unwrap_or_default();
        }

        // link endpoints report pmids as `id` with `source: MED`
        let pmid = non_empty(result.pmid).or_else(|| {
            (result.source.as_deref() == Some("MED"))
                .then_some(result.id.clone())
                .flatten()
        });

        record.title = non_empty(result.title.as_deref().map(clean_text));
        record.authors = authors;
        record.journal = non_empty(
            result
                .journal_info
                .and_then(|info| info.journal)
                .and_then(|journal| journal.title)
                .or(result.journal_title)
                .or(result.journal_abbreviation),
        );
        record.publication_date = non_empty(result.first_publication_date).or(result.pub_year);
        record.doi = non_empty(result.doi);
        record.pmcid = non_empty(result.pmcid);
        record.abstract_text = non_empty(result.abstract_text.as_deref().map(clean_text));
        record.citation_count = result.cited_by_count;
        record.url = pmid
            .as_ref()
            .map(|p| format!("https://europepmc.org/article/MED/{p}"))
            .or_else(|| record.doi.as_ref().map(|d| format!("https://doi.org/{d}")));
        record.pmid = pmid;
        record
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcAdapter {
    fn name(&self) -> &str {
        EUROPE_PMC
    }

    fn description(&self) -> &str {
        "Europe PMC - life-science literature with citation and reference links"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            search: true,
            details: vec![IdentifierKind::Doi, IdentifierKind::Pmid, IdentifierKind::Pmcid],
            references: vec![IdentifierKind::Pmid, IdentifierKind::Pmcid],
            citing: vec![IdentifierKind::Pmid, IdentifierKind::Pmcid],
            similar: Vec::new(),
            converts_identifiers: true,
        }
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        let results = self.run_search(query, max_results).await?;
        let records: Vec<RawRecord> = results
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect();

        info!("Europe PMC search returned {} records", records.len());
        Ok(records)
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        let query = Self::id_query(id).ok_or_else(|| unsupported(EUROPE_PMC, "details", id))?;
        self.run_search(&query, 1)
            .await?
            .into_iter()
            .next()
            .map(Self::to_record)
            .ok_or_else(|| AdapterError::NotFound(format!("{id} not in Europe PMC")))
    }

    async fn fetch_references(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let path = Self::article_path(id).ok_or_else(|| unsupported(EUROPE_PMC, "references", id))?;
        let url = format!("{}/{}/references", self.base_url, path);
        let page_size = max_results.to_string();

        let response: ReferenceResponse = send_json(self.client.get(&url).query(&[
            ("format", "json"),
            ("pageSize", page_size.as_str()),
        ]))
        .await?;

        Ok(response
            .reference_list
            .map(|list| list.reference)
            .unwrap_or_default()
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect())
    }

    async fn fetch_citing(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let path = Self::article_path(id).ok_or_else(|| unsupported(EUROPE_PMC, "citing articles", id))?;
        let url = format!("{}/{}/citations", self.base_url, path);
        let page_size = max_results.to_string();

        let response: CitationResponse = send_json(self.client.get(&url).query(&[
            ("format", "json"),
            ("pageSize", page_size.as_str()),
        ]))
        .await?;

        Ok(response
            .citation_list
            .map(|list| list.citation)
            .unwrap_or_default()
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect())
    }

    async fn convert_identifier(
        &self,
        id: &Identifier,
        target: IdentifierKind,
    ) -> Result<Option<Identifier>, AdapterError> {
        let record = self.fetch_details(id).await?;
        let value = match target {
            IdentifierKind::Doi => record.doi,
            IdentifierKind::Pmid => record.pmid,
            IdentifierKind::Pmcid => record.pmcid,
            IdentifierKind::ArxivId | IdentifierKind::Unknown => None,
        };
        Ok(value.map(|v| Identifier::new(target, v)))
    }
}
