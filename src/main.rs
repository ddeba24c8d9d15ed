//! CLI entry point for the aggregation engine.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use research_aggregator::tools::quality::JournalNames;
use research_aggregator::tools::{AnalysisType, BatchExport, RelationType, SeedIdentifiers};
use research_aggregator::{
    logging, AggregationEngine, BatchDetailsInput, BatchSearchInput, Config, DetailsInput,
    ExportOptions, QualityInput, ReferencesInput, RelationsInput, SearchInput,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

mod cli;

use cli::{optional_list, Args, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            emit(&e.to_response(json!({ "config": args.config })), args.pretty)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    match args.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    logging::init(&config.logging);
    debug!(?args, "CLI arguments parsed");

    if matches!(args.command, Command::Config) {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let engine = match AggregationEngine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            emit(&e.to_response(json!({})), args.pretty)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let shutdown = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; cancelling in-flight requests");
            shutdown.shutdown();
        }
    });

    let pretty = args.pretty;
    let outcome = run(&engine, args.command).await;
    match outcome {
        Ok(value) => {
            emit(&value, pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Err((error, context)) => {
            emit(&error.to_response(context), pretty)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

type CommandOutcome =
    std::result::Result<serde_json::Value, (research_aggregator::Error, serde_json::Value)>;

/// Run one command; errors carry the request context for the error response
async fn run(engine: &AggregationEngine, command: Command) -> CommandOutcome {
    match command {
        Command::Search {
            query,
            sources,
            max_results,
            strategy,
        } => {
            let context = json!({ "query": query, "strategy": strategy });
            let input = SearchInput {
                query,
                sources: optional_list(sources),
                max_results,
                strategy,
            };
            to_value(engine.search(input).await, context)
        }
        Command::Details {
            identifier,
            id_type,
            sources,
            quality,
        } => {
            let context = json!({ "identifier": identifier });
            let input = DetailsInput {
                identifier,
                id_type,
                sources: optional_list(sources),
                include_quality: quality,
            };
            to_value(engine.get_details(input).await, context)
        }
        Command::References {
            identifier,
            id_type,
            max_results,
            sources,
        } => {
            let context = json!({ "identifier": identifier });
            let input = ReferencesInput {
                identifier,
                id_type,
                max_results,
                sources: optional_list(sources),
            };
            to_value(engine.get_references(input).await, context)
        }
        Command::Relations {
            mut identifiers,
            id_type,
            relations,
            network,
            depth,
            max_results,
            sources,
        } => {
            let context = json!({ "identifiers": identifiers });
            let identifiers = if identifiers.len() == 1 {
                SeedIdentifiers::One(identifiers.remove(0))
            } else {
                SeedIdentifiers::Many(identifiers)
            };
            let input = RelationsInput {
                identifiers,
                id_type,
                relation_types: if relations.is_empty() {
                    RelationType::ALL.to_vec()
                } else {
                    relations
                },
                analysis_type: if network {
                    AnalysisType::Network
                } else {
                    AnalysisType::Basic
                },
                max_results,
                max_depth: depth,
                sources: optional_list(sources),
            };
            to_value(engine.get_relations(input).await, context)
        }
        Command::BatchSearch {
            queries,
            sources,
            max_results,
            strategy,
            concurrency,
            export,
        } => {
            let context = json!({ "queries": queries, "strategy": strategy });
            let input = BatchSearchInput {
                queries,
                sources: optional_list(sources),
                max_results,
                strategy,
                max_concurrent: concurrency,
            };
            let result = engine.batch_search(input).await;
            with_export(engine, result, export.options(), context).await
        }
        Command::BatchDetails {
            identifiers,
            id_type,
            sources,
            quality,
            concurrency,
            export,
        } => {
            let context = json!({ "identifiers": identifiers });
            let input = BatchDetailsInput {
                identifiers,
                id_type,
                sources: optional_list(sources),
                include_quality: quality,
                max_concurrent: concurrency,
            };
            let result = engine.batch_details(input).await;
            with_export(engine, result, export.options(), context).await
        }
        Command::Quality { journals, sort_by } => {
            let context = json!({ "journals": journals });
            let input = QualityInput {
                journal: JournalNames::Many(journals),
                sort_by,
            };
            to_value(engine.get_quality(input).await, context)
        }
        Command::PurgeCache { all } => match engine.purge_cache(all).await {
            Ok(removed) => Ok(json!({
                "success": true,
                "removed": removed,
                "stats": engine.cache_stats().await,
            })),
            Err(e) => Err((e, json!({ "all": all }))),
        },
        Command::Config => to_value(Ok(engine.context().config()), json!({})),
    }
}

/// Serialize a batch response, writing it to disk first when asked; the
/// export summary is added under `export`
async fn with_export<T: BatchExport>(
    engine: &AggregationEngine,
    result: research_aggregator::Result<T>,
    options: Option<ExportOptions>,
    context: serde_json::Value,
) -> CommandOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return Err((e, context)),
    };
    let summary = match options {
        Some(options) => match engine.export(&response, &options).await {
            Ok(summary) => Some(summary),
            Err(e) => return Err((e, context)),
        },
        None => None,
    };
    let mut value = to_value(Ok(response), context.clone())?;
    if let (Some(summary), Some(object)) = (summary, value.as_object_mut()) {
        let summary = serde_json::to_value(summary).map_err(|e| (e.into(), context))?;
        object.insert("export".to_string(), summary);
    }
    Ok(value)
}

fn to_value<T: Serialize>(
    result: research_aggregator::Result<T>,
    context: serde_json::Value,
) -> CommandOutcome {
    match result {
        Ok(response) => serde_json::to_value(response).map_err(|e| (e.into(), context)),
        Err(e) => Err((e, context)),
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
