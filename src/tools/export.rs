//! Writing batch results to disk as JSON or CSV.

use super::batch::{BatchDetailsResponse, BatchSearchResponse};
use crate::merge::CanonicalRecord;
use crate::{Error, Result};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

const DEFAULT_EXPORT_DIR: &str = "exports";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// The whole batch response, optionally wrapped with export metadata
    #[default]
    Json,
    /// One row per record
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::invalid_input(
                "format",
                format!("unsupported export format '{other}' (json, csv)"),
            )),
        }
    }
}

const fn default_include_metadata() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportOptions {
    #[serde(default)]
    pub format: ExportFormat,
    /// Target file (default: `exports/batch_export_<timestamp>.<ext>`)
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Wrap JSON output with export time and record count
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

impl ExportOptions {
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            output_path: None,
            include_metadata: default_include_metadata(),
        }
    }

    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    fn resolve_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            PathBuf::from(DEFAULT_EXPORT_DIR).join(format!(
                "batch_export_{}.{}",
                Utc::now().format("%Y%m%dT%H%M%S"),
                self.format.extension()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub records_exported: usize,
    pub bytes: u64,
}

/// Batch results that can be exported
pub trait BatchExport: Serialize {
    /// Records written as CSV rows and counted in the metadata
    fn export_records(&self) -> Vec<&CanonicalRecord>;
}

impl BatchExport for BatchSearchResponse {
    fn export_records(&self) -> Vec<&CanonicalRecord> {
        self.records.iter().collect()
    }
}

impl BatchExport for BatchDetailsResponse {
    fn export_records(&self) -> Vec<&CanonicalRecord> {
        self.results
            .iter()
            .filter_map(|result| result.response.as_ref())
            .map(|response| &response.record)
            .collect()
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: Option<&'a str>,
    authors: String,
    journal: Option<&'a str>,
    publication_date: Option<&'a str>,
    doi: Option<&'a str>,
    pmid: Option<&'a str>,
    pmcid: Option<&'a str>,
    arxiv_id: Option<&'a str>,
    citation_count: Option<u64>,
    sources: String,
    url: Option<&'a str>,
    #[serde(rename = "abstract")]
    abstract_text: Option<&'a str>,
}

impl<'a> From<&'a CanonicalRecord> for CsvRow<'a> {
    fn from(record: &'a CanonicalRecord) -> Self {
        Self {
            title: record.title.as_deref(),
            authors: record.authors.join("; "),
            journal: record.journal.as_deref(),
            publication_date: record.publication_date.as_deref(),
            doi: record.doi.as_deref(),
            pmid: record.pmid.as_deref(),
            pmcid: record.pmcid.as_deref(),
            arxiv_id: record.arxiv_id.as_deref(),
            citation_count: record.citation_count,
            sources: record.sources.iter().cloned().collect::<Vec<_>>().join("; "),
            url: record.url.as_deref(),
            abstract_text: record.abstract_text.as_deref(),
        }
    }
}

/// Render `results` in `format`; returns the bytes and the record count.
/// Metadata only applies to JSON.
pub fn render<T: BatchExport>(
    results: &T,
    format: ExportFormat,
    include_metadata: bool,
) -> Result<(Vec<u8>, usize)> {
    let records = results.export_records();
    let count = records.len();

    let bytes = match format {
        ExportFormat::Json => {
            let results = serde_json::to_value(results)?;
            let body = if include_metadata {
                json!({
                    "export_metadata": {
                        "exported_at": Utc::now().to_rfc3339(),
                        "total_records": count,
                        "format": format,
                        "generator": concat!("research-aggregator/", env!("CARGO_PKG_VERSION")),
                    },
                    "results": results,
                })
            } else {
                results
            };
            serde_json::to_vec_pretty(&body)?
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for record in records {
                writer.serialize(CsvRow::from(record))?;
            }
            writer
                .into_inner()
                .map_err(|e| Error::Export(e.error().to_string()))?
        }
    };
    Ok((bytes, count))
}

/// Render `results` and write them to the configured or default path,
/// creating parent directories as needed
pub async fn export_to_file<T: BatchExport>(
    results: &T,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let (bytes, records_exported) = render(results, options.format, options.include_metadata)?;
    let path = options.resolve_path();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &bytes).await?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());

    info!(
        "Exported {} record(s) as {} to {}",
        records_exported,
        options.format,
        path.display()
    );
    Ok(ExportSummary {
        path,
        format: options.format,
        records_exported,
        bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
    })
}
