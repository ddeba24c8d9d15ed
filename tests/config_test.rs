mod common;

use common::{record, MockSource};
use research_aggregator::{AggregationEngine, Config, Error, LogFormat, SearchInput, ServiceContext};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn write_toml(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn test_file_then_environment_layering() {
    let dir = TempDir::new().unwrap();
    let path = write_toml(
        &dir,
        r#"
        [orchestrator]
        request_deadline_secs = 12

        [search]
        default_sources = ["crossref", "openalex"]

        [sources.openalex]
        email = "lab@example.org"

        [logging]
        format = "json"
        "#,
    );

    let from_file = Config::load(Some(&path)).unwrap();
    assert_eq!(from_file.orchestrator.request_deadline_secs, 12);
    assert_eq!(from_file.search.default_sources, vec!["crossref", "openalex"]);
    assert_eq!(
        from_file.sources["openalex"].email.as_deref(),
        Some("lab@example.org")
    );
    assert_eq!(from_file.logging.format, LogFormat::Json);
    // Defaults fill everything the file leaves out
    assert_eq!(from_file.orchestrator.default_timeout_secs, 15);
    assert!(from_file.sources.contains_key("pubmed"));

    // Environment wins over the file
    std::env::set_var("RESEARCH_AGGREGATOR__ORCHESTRATOR__REQUEST_DEADLINE_SECS", "45");
    std::env::set_var("RESEARCH_AGGREGATOR__SEARCH__DEFAULT_SOURCES", "pubmed,crossref");
    let layered = Config::load(Some(&path));
    std::env::remove_var("RESEARCH_AGGREGATOR__ORCHESTRATOR__REQUEST_DEADLINE_SECS");
    std::env::remove_var("RESEARCH_AGGREGATOR__SEARCH__DEFAULT_SOURCES");

    let layered = layered.unwrap();
    assert_eq!(layered.orchestrator.request_deadline_secs, 45);
    assert_eq!(layered.search.default_sources, vec!["pubmed", "crossref"]);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();

    let zero_ttl = write_toml(&dir, "[cache]\nttl_secs = 0\n");
    let err = Config::load(Some(&zero_ttl)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "cache.ttl_secs"));

    let over_limit = write_toml(&dir, "[search]\ndefault_max_results = 500\n");
    assert_eq!(
        Config::load(Some(&over_limit)).unwrap_err().error_type(),
        "InputError"
    );

    let missing = dir.path().join("absent.toml");
    assert!(Config::load(Some(&missing)).is_err());
}

#[test]
fn test_rendered_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.search.default_max_results = 25;
    config.cache.memory_only = true;

    let path = write_toml(&dir, &config.to_toml().unwrap());
    let reloaded = Config::load(Some(&path)).unwrap();
    assert_eq!(reloaded.search.default_max_results, 25);
    assert!(reloaded.cache.memory_only);
}

#[tokio::test]
async fn test_durable_cache_serves_a_fresh_context() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.cache.path = Some(dir.path().join("results"));

    let build = |source: Arc<MockSource>| {
        let ctx = ServiceContext::builder(config.clone())
            .with_adapter(source)
            .build()
            .unwrap();
        AggregationEngine::new(Arc::new(ctx))
    };
    let input = SearchInput {
        sources: Some(vec!["europe_pmc".to_string()]),
        ..SearchInput::new("durable")
    };

    let first_source = Arc::new(
        MockSource::new("europe_pmc").with_search(vec![record(Some("10.1000/d"), "Durable", "2020")]),
    );
    let first = build(first_source.clone());
    assert!(!first.search(input.clone()).await.unwrap().cache_hit);
    drop(first);

    let second_source = Arc::new(MockSource::new("europe_pmc"));
    let second = build(second_source.clone());
    let response = second.search(input).await.unwrap();

    assert!(response.cache_hit);
    assert_eq!(response.total, 1);
    assert_eq!(first_source.searches(), 1);
    assert_eq!(second_source.searches(), 0);
}
