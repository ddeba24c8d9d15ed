use super::traits::{unsupported, AdapterCapabilities, AdapterError, SourceAdapter};
use super::{clean_text, string_or_number, CROSSREF};
use crate::client::{iso_date, non_empty, send_json, RawRecord};
use crate::identity::{normalize_doi, Identifier, IdentifierKind};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

#[allow(clippy::expect_used)]
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid markup pattern"));

/// Crossref REST API adapter. DOI-keyed; references come from the deposited
/// reference list of the work itself.
pub struct CrossrefAdapter {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    message: ItemList,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct WorkEnvelope {
    message: Work,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<WorkAuthor>,
    #[serde(default)]
    container_title: Vec<String>,
    issued: Option<DateParts>,
    published: Option<DateParts>,
    published_print: Option<DateParts>,
    published_online: Option<DateParts>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    is_referenced_by_count: Option<u64>,
    #[serde(default)]
    reference: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct WorkAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DateParts {
    #[serde(default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Reference {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    article_title: Option<String>,
    journal_title: Option<String>,
    author: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    year: Option<String>,
    unstructured: Option<String>,
}

impl DateParts {
    fn to_iso(&self) -> Option<String> {
        let parts = self.date_parts.first()?;
        let part = |i: usize| parts.get(i).copied().flatten();
        iso_date(part(0), part(1), part(2))
    }
}

impl CrossrefAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Contact address for the Crossref "polite" pool
    #[must_use]
    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto;
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.mailto {
            Some(mailto) => request.query(&[("mailto", mailto)]),
            None => request,
        }
    }

    async fn work(&self, id: &Identifier, operation: &str) -> Result<Work, AdapterError> {
        if id.kind != IdentifierKind::Doi {
            return Err(unsupported(CROSSREF, operation, id));
        }
        let path = format!("/works/{}", urlencoding::encode(&id.value));
        let envelope: WorkEnvelope = send_json(self.get(&path)).await?;
        Ok(envelope.message)
    }

    fn to_record(work: Work) -> RawRecord {
        let mut record = RawRecord::new(CROSSREF);

        record.publication_date = [
            &work.published_print,
            &work.published_online,
            &work.published,
            &work.issued,
        ]
        .into_iter()
        .flatten()
        .find_map(DateParts::to_iso);

        record.title = non_empty(work.title.into_iter().next().map(|t| clean_text(&t)));
        record.authors = work
            .author
            .into_iter()
            .filter_map(|a| match (a.given, a.family) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (None, Some(family)) => Some(family),
                (given, None) => a.name.or(given),
            })
            .filter_map(|a| non_empty(Some(a)))
            .collect();
        record.journal = non_empty(work.container_title.into_iter().next());
        record.abstract_text = work.abstract_text.as_deref().and_then(strip_markup);
        record.citation_count = work.is_referenced_by_count;
        record.url = non_empty(work.url);
        record.doi = work.doi.as_deref().and_then(normalize_doi);
        if record.url.is_none() {
            record.url = record.doi.as_ref().map(|d| format!("https://doi.org/{d}"));
        }
        record
    }

    fn reference_to_record(reference: Reference) -> Option<RawRecord> {
        let mut record = RawRecord::new(CROSSREF);
        record.doi = reference.doi.as_deref().and_then(normalize_doi);
        record.title = non_empty(reference.article_title.as_deref().map(clean_text))
            .or_else(|| non_empty(reference.unstructured.as_deref().map(clean_text)));
        record.journal = non_empty(reference.journal_title);
        record.authors = non_empty(reference.author).into_iter().collect();
        record.publication_date = reference
            .year
            .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()));
        record.url = record.doi.as_ref().map(|d| format!("https://doi.org/{d}"));

        (record.doi.is_some() || record.title.is_some()).then_some(record)
    }
}

/// Drop JATS/HTML tags from an abstract
fn strip_markup(text: &str) -> Option<String> {
    non_empty(Some(clean_text(&MARKUP.replace_all(text, " "))))
}

#[async_trait]
impl SourceAdapter for CrossrefAdapter {
    fn name(&self) -> &str {
        CROSSREF
    }

    fn description(&self) -> &str {
        "Crossref - DOI registration metadata with deposited reference lists"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            search: true,
            details: vec![IdentifierKind::Doi],
            references: vec![IdentifierKind::Doi],
            citing: Vec::new(),
            similar: Vec::new(),
            converts_identifiers: false,
        }
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        let rows = max_results.to_string();
        let envelope: ListEnvelope = send_json(
            self.get("/works")
                .query(&[("query", query), ("rows", rows.as_str())]),
        )
        .await?;

        let records: Vec<RawRecord> = envelope
            .message
            .items
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect();
        info!("Crossref search returned {} records", records.len());
        Ok(records)
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        let work = self.work(id, "details").await?;
        Ok(Self::to_record(work))
    }

    async fn fetch_references(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let work = self.work(id, "references").await?;
        debug!("Crossref deposited {} references for {}", work.reference.len(), id);

        Ok(work
            .reference
            .into_iter()
            .filter_map(Self::reference_to_record)
            .take(max_results as usize)
            .collect())
    }
}
