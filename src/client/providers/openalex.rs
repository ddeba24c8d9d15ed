use super::traits::{
    unsupported, AdapterCapabilities, AdapterError, QualityProvider, SourceAdapter,
};
use super::{clean_text, OPENALEX};
use crate::client::{non_empty, send_json, RawRecord};
use crate::identity::{normalize_doi, Identifier, IdentifierKind};
use crate::merge::quality::QualityMetrics;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.openalex.org";
/// OpenAlex caps OR-filters at 50 values
const MAX_FILTER_IDS: usize = 50;

/// OpenAlex adapter: works search and lookup, reference/citing/related graph,
/// and venue-level metrics for the quality merger.
pub struct OpenAlexAdapter {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Work {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_date: Option<String>,
    publication_year: Option<i64>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    ids: Option<WorkIds>,
    cited_by_count: Option<u64>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    referenced_works: Vec<String>,
    #[serde(default)]
    related_works: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<NamedEntity>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<NamedEntity>,
    landing_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkIds {
    pmid: Option<String>,
    pmcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    display_name: Option<String>,
    works_count: Option<u64>,
    cited_by_count: Option<u64>,
    summary_stats: Option<SummaryStats>,
}

#[derive(Debug, Deserialize)]
struct SummaryStats {
    #[serde(rename = "2yr_mean_citedness")]
    two_year_mean_citedness: Option<f64>,
    h_index: Option<u64>,
    i10_index: Option<u64>,
}

impl OpenAlexAdapter {
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

    /// OpenAlex external-id path segment (`doi:...`, `pmid:...`, `pmcid:...`)
    fn work_key(id: &Identifier) -> Option<String> {
        match id.kind {
            IdentifierKind::Doi => Some(format!("doi:{}", id.value)),
            IdentifierKind::Pmid => Some(format!("pmid:{}", id.value)),
            IdentifierKind::Pmcid => Some(format!("pmcid:{}", id.value)),
            IdentifierKind::ArxivId | IdentifierKind::Unknown => None,
        }
    }

    async fn work(&self, id: &Identifier, operation: &str) -> Result<Work, AdapterError> {
        let key = Self::work_key(id).ok_or_else(|| unsupported(OPENALEX, operation, id))?;
        send_json(self.get(&format!("/works/{key}"))).await
    }

    async fn filtered_works(
        &self,
        filter: &str,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let per_page = max_results.clamp(1, 200).to_string();
        let response: ListResponse<Work> = send_json(
            self.get("/works")
                .query(&[("filter", filter), ("per-page", per_page.as_str())]),
        )
        .await?;
        Ok(response
            .results
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect())
    }

    /// Batch-resolve OpenAlex work URLs into records
    async fn works_by_id(
        &self,
        work_urls: &[String],
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let ids: Vec<&str> = work_urls
            .iter()
            .map(|url| short_id(url))
            .take((max_results as usize).min(MAX_FILTER_IDS))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = format!("ids.openalex:{}", ids.join("|"));
        self.filtered_works(&filter, max_results).await
    }

    fn to_record(work: Work) -> RawRecord {
        let mut record = RawRecord::new(OPENALEX);

        let abstract_text = work.abstract_inverted_index.as_ref().and_then(rebuild_abstract);
        let (pmid, pmcid) = work
            .ids
            .map(|ids| {
                (
                    ids.pmid.as_deref().map(short_id).map(str::to_string),
                    ids.pmcid.as_deref().map(short_id).map(|p| {
                        if p.to_ascii_uppercase().starts_with("PMC") {
                            p.to_ascii_uppercase()
                        } else {
                            format!("PMC{p}")
                        }
                    }),
                )
            })
            .unwrap_or_default();

        record.title = non_empty(work.title.or(work.display_name).as_deref().map(clean_text));
        record.authors = work
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|author| non_empty(author.display_name)))
            .collect();
        let location = work.primary_location;
        record.url = location
            .as_ref()
            .and_then(|l| l.landing_page_url.clone())
            .or(work.id);
        record.journal = location
            .and_then(|l| l.source)
            .and_then(|s| non_empty(s.display_name));
        record.publication_date = non_empty(work.publication_date)
            .or_else(|| work.publication_year.map(|y| format!("{y:04}")));
        record.doi = work.doi.as_deref().and_then(normalize_doi);
        record.pmid = non_empty(pmid);
        record.pmcid = non_empty(pmcid);
        record.abstract_text = abstract_text;
        record.citation_count = work.cited_by_count;
        record
    }

    fn to_metrics(journal_name: &str, venue: Venue) -> QualityMetrics {
        let stats = venue.summary_stats;
        QualityMetrics {
            h_index: stats.as_ref().and_then(|s| s.h_index),
            i10_index: stats.as_ref().and_then(|s| s.i10_index),
            citation_rate: stats.as_ref().and_then(|s| s.two_year_mean_citedness),
            cited_by_count: venue.cited_by_count,
            works_count: venue.works_count,
            data_sources: vec![OPENALEX.to_string()],
            ..QualityMetrics::new(journal_name)
        }
    }
}

/// `https://openalex.org/W2741809807` -> `W2741809807`; also strips the
/// PubMed/PMC URL prefixes OpenAlex uses for external ids
fn short_id(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// Rebuild plain text from OpenAlex's `{word: [positions]}` abstract index
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable();
    let words: Vec<&str> = positioned.into_iter().map(|(_, word)| word).collect();
    Some(words.join(" "))
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn name(&self) -> &str {
        OPENALEX
    }

    fn description(&self) -> &str {
        "OpenAlex - open scholarly graph with citation and related-work links"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        let ids = vec![IdentifierKind::Doi, IdentifierKind::Pmid, IdentifierKind::Pmcid];
        AdapterCapabilities {
            search: true,
            details: ids.clone(),
            references: ids.clone(),
            citing: ids.clone(),
            similar: ids,
            converts_identifiers: true,
        }
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        let per_page = max_results.clamp(1, 200).to_string();
        let response: ListResponse<Work> = send_json(
            self.get("/works")
                .query(&[("search", query), ("per-page", per_page.as_str())]),
        )
        .await?;

        let records: Vec<RawRecord> = response
            .results
            .into_iter()
            .take(max_results as usize)
            .map(Self::to_record)
            .collect();
        info!("OpenAlex search returned {} records", records.len());
        Ok(records)
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        Ok(Self::to_record(self.work(id, "details").await?))
    }

    async fn fetch_references(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let work = self.work(id, "references").await?;
        debug!("OpenAlex lists {} referenced works for {}", work.referenced_works.len(), id);
        self.works_by_id(&work.referenced_works, max_results).await
    }

    async fn fetch_citing(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let work = self.work(id, "citing articles").await?;
        let Some(work_id) = work.id.as_deref().map(short_id) else {
            return Ok(Vec::new());
        };
        self.filtered_works(&format!("cites:{work_id}"), max_results)
            .await
    }

    async fn fetch_similar(
        &self,
        id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        let work = self.work(id, "similar articles").await?;
        self.works_by_id(&work.related_works, max_results).await
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

#[async_trait]
impl QualityProvider for OpenAlexAdapter {
    fn name(&self) -> &str {
        OPENALEX
    }

    async fn get_metrics(&self, journal_name: &str) -> Result<QualityMetrics, AdapterError> {
        let response: ListResponse<Venue> = send_json(
            self.get("/sources")
                .query(&[("search", journal_name), ("per-page", "5")]),
        )
        .await?;

        // prefer an exact (case-insensitive) title match over search rank
        let mut venues = response.results;
        let exact = venues.iter().position(|v| {
            v.display_name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(journal_name.trim()))
        });
        let venue = match exact {
            Some(i) => venues.swap_remove(i),
            None if !venues.is_empty() => venues.swap_remove(0),
            None => {
                return Err(AdapterError::NotFound(format!(
                    "no OpenAlex source matches '{journal_name}'"
                )))
            }
        };

        Ok(Self::to_metrics(journal_name, venue))
    }
}
