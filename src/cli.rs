//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use research_aggregator::{ExportFormat, ExportOptions, IdentifierKind, RelationType, Strategy};

/// Query PubMed, Europe PMC, Crossref, OpenAlex and arXiv as one source.
///
/// Every command prints its response as JSON on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "research-aggregator")]
#[command(author, version, about)]
pub struct Args {
    /// Configuration file (default: <config dir>/research-aggregator/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Pretty-print JSON responses
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keyword search across sources
    Search {
        query: String,
        /// Source to query; repeat for several (default: configured sources)
        #[arg(short, long = "source")]
        sources: Vec<String>,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: u32,
        /// `union` or `intersection`
        #[arg(long, default_value = "union")]
        strategy: Strategy,
    },
    /// Look up one work by DOI, PMID, PMCID or arXiv id
    Details {
        identifier: String,
        /// Expected identifier kind (doi, pmid, pmcid, arxiv)
        #[arg(long)]
        id_type: Option<IdentifierKind>,
        #[arg(short, long = "source")]
        sources: Vec<String>,
        /// Attach journal quality metrics
        #[arg(long)]
        quality: bool,
    },
    /// Works cited by one work
    References {
        identifier: String,
        #[arg(long)]
        id_type: Option<IdentifierKind>,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: u32,
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },
    /// References, citing and similar works around one or more works
    Relations {
        #[arg(required = true)]
        identifiers: Vec<String>,
        #[arg(long)]
        id_type: Option<IdentifierKind>,
        /// Relation to collect; repeat for several (default: all)
        #[arg(short, long = "relation", value_parser = parse_relation)]
        relations: Vec<RelationType>,
        /// Also build the citation network
        #[arg(long)]
        network: bool,
        /// Hops the network grows out from the seeds
        #[arg(long, default_value_t = 1)]
        depth: u32,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: u32,
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },
    /// Several keyword searches, merged into one record list
    BatchSearch {
        #[arg(required = true)]
        queries: Vec<String>,
        #[arg(short, long = "source")]
        sources: Vec<String>,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: u32,
        #[arg(long, default_value = "union")]
        strategy: Strategy,
        /// Queries in flight at once
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Look up several works by identifier
    BatchDetails {
        #[arg(required = true)]
        identifiers: Vec<String>,
        #[arg(long)]
        id_type: Option<IdentifierKind>,
        #[arg(short, long = "source")]
        sources: Vec<String>,
        #[arg(long)]
        quality: bool,
        /// Lookups in flight at once
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Journal quality metrics for one or more journals
    Quality {
        #[arg(required = true)]
        journals: Vec<String>,
        /// Sort by this metric, descending
        #[arg(long)]
        sort_by: Option<String>,
    },
    /// Remove expired cache entries
    PurgeCache {
        /// Remove every entry, not only expired ones
        #[arg(long)]
        all: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Writing batch results to a file
#[derive(clap::Args, Debug, Default)]
pub struct ExportArgs {
    /// Export file (default: exports/batch_export_<timestamp>.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// `json` or `csv`; setting either this or --output enables export
    #[arg(long)]
    pub format: Option<ExportFormat>,
    /// Leave the export metadata out of JSON exports
    #[arg(long)]
    pub no_metadata: bool,
}

impl ExportArgs {
    /// Export options, if an export was requested
    pub fn options(&self) -> Option<ExportOptions> {
        if self.output.is_none() && self.format.is_none() {
            return None;
        }
        let format = self.format.unwrap_or_else(|| {
            self.output
                .as_deref()
                .and_then(|path| path.extension())
                .and_then(|ext| ext.to_str())
                .and_then(|ext| ext.parse().ok())
                .unwrap_or_default()
        });
        let mut options = ExportOptions::new(format);
        options.output_path = self.output.clone();
        options.include_metadata = !self.no_metadata;
        Some(options)
    }
}

fn parse_relation(value: &str) -> Result<RelationType, String> {
    RelationType::ALL
        .into_iter()
        .find(|relation| relation.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| format!("unknown relation '{value}' (references, citing, similar)"))
}

/// Empty repeated-flag lists mean "not specified"
pub fn optional_list(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let args = Args::try_parse_from(["research-aggregator", "search", "crispr"]).unwrap();
        match args.command {
            Command::Search {
                query,
                sources,
                max_results,
                strategy,
            } => {
                assert_eq!(query, "crispr");
                assert!(sources.is_empty());
                assert_eq!(max_results, 10);
                assert_eq!(strategy, Strategy::Union);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let args = Args::try_parse_from([
            "research-aggregator",
            "details",
            "10.1038/nature12373",
            "--config",
            "/tmp/agg.toml",
            "--id-type",
            "doi",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/agg.toml")));
        assert!(matches!(
            args.command,
            Command::Details {
                id_type: Some(IdentifierKind::Doi),
                ..
            }
        ));
    }

    #[test]
    fn test_relation_flags() {
        let args = Args::try_parse_from([
            "research-aggregator",
            "relations",
            "PMID:12345",
            "10.1000/a",
            "--depth",
            "2",
            "-r",
            "citing",
            "--relation",
            "Similar",
            "--network",
        ])
        .unwrap();
        match args.command {
            Command::Relations {
                identifiers,
                relations,
                network,
                depth,
                ..
            } => {
                assert_eq!(identifiers, vec!["PMID:12345", "10.1000/a"]);
                assert_eq!(relations, vec![RelationType::Citing, RelationType::Similar]);
                assert!(network);
                assert_eq!(depth, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(
            Args::try_parse_from(["research-aggregator", "relations", "x", "-r", "cited"]).is_err()
        );
    }

    #[test]
    fn test_batch_search_export_flags() {
        let args = Args::try_parse_from([
            "research-aggregator",
            "batch-search",
            "crispr",
            "base editing",
            "--output",
            "/tmp/out.csv",
            "--concurrency",
            "5",
        ])
        .unwrap();
        match args.command {
            Command::BatchSearch {
                queries,
                concurrency,
                export,
                ..
            } => {
                assert_eq!(queries, vec!["crispr", "base editing"]);
                assert_eq!(concurrency, 5);
                let options = export.options().unwrap();
                assert_eq!(options.format, ExportFormat::Csv);
                assert_eq!(options.output_path, Some(PathBuf::from("/tmp/out.csv")));
                assert!(options.include_metadata);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_batch_details_exports_only_when_asked() {
        let args =
            Args::try_parse_from(["research-aggregator", "batch-details", "10.1/a", "PMID:1"])
                .unwrap();
        match args.command {
            Command::BatchDetails {
                identifiers,
                export,
                ..
            } => {
                assert_eq!(identifiers.len(), 2);
                assert!(export.options().is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let args = Args::try_parse_from([
            "research-aggregator",
            "batch-details",
            "10.1/a",
            "--format",
            "json",
            "--no-metadata",
        ])
        .unwrap();
        let Command::BatchDetails { export, .. } = args.command else {
            panic!("expected batch-details");
        };
        let options = export.options().unwrap();
        assert_eq!(options.format, ExportFormat::Json);
        assert!(options.output_path.is_none());
        assert!(!options.include_metadata);

        assert!(Args::try_parse_from(["research-aggregator", "batch-details"]).is_err());
        assert!(Args::try_parse_from([
            "research-aggregator",
            "batch-details",
            "10.1/a",
            "--format",
            "xlsx"
        ])
        .is_err());
    }

    #[test]
    fn test_quality_requires_a_journal() {
        let result = Args::try_parse_from(["research-aggregator", "quality"]);
        assert!(result.is_err());
    }
}
