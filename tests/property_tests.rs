//! Property-based tests for cache keys and record merging

use proptest::prelude::*;
use research_aggregator::identity::normalize_doi;
use research_aggregator::merge::normalize_title;
use research_aggregator::{FingerprintBuilder, MergeEngine, RawRecord, Strategy as MergeStrategy};

const SOURCES: [&str; 5] = ["europe_pmc", "pubmed", "crossref", "openalex", "arxiv"];

/// Records drawn from a small pool of works so that duplicates are common.
/// Sources disagree on title punctuation and suffixes and on the author list,
/// so a merged record can combine a title and an author list no single input
/// carried.
fn raw_record() -> impl Strategy<Value = RawRecord> {
    (
        0usize..3,
        0usize..SOURCES.len(),
        any::<bool>(),
        0usize..3,
        0usize..4,
        prop::option::of(2000u32..2024),
        prop::option::of(0u64..500),
    )
        .prop_map(
            |(work, source, has_doi, title_form, author_form, year, citations)| RawRecord {
                title: Some(match title_form {
                    0 => format!("Study of effect {work}"),
                    1 => format!("Study-of effect {work}."),
                    _ => format!("Study of effect {work} in mice"),
                }),
                authors: match author_form {
                    0 => Vec::new(),
                    1 => vec![format!("Ada Smith{work}")],
                    2 => vec![format!("Smith{work}, A"), "Bo Jones".to_string()],
                    _ => vec![format!("Jones{work} B")],
                },
                doi: has_doi.then(|| format!("10.1000/w{work}")),
                publication_date: year.map(|y| y.to_string()),
                citation_count: citations,
                ..RawRecord::new(SOURCES[source])
            },
        )
}

mod fingerprint_props {
    use super::*;

    proptest! {
        #[test]
        fn test_source_order_irrelevant(
            sources in prop::collection::vec(prop::sample::select(SOURCES.to_vec()), 0..6),
        ) {
            let mut reversed = sources.clone();
            reversed.reverse();

            let a = FingerprintBuilder::new("search").set("sources", &sources).finish();
            let b = FingerprintBuilder::new("search").set("sources", &reversed).finish();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_query_case_and_spacing_irrelevant(words in prop::collection::vec("[a-z]{1,8}", 1..5)) {
            let plain = words.join(" ");
            let noisy = format!("  {}  ", words.join("   ").to_uppercase());

            let a = FingerprintBuilder::new("search").text("query", &plain).finish();
            let b = FingerprintBuilder::new("search").text("query", &noisy).finish();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_namespaces_never_collide(query in "[a-z ]{1,20}") {
            let search = FingerprintBuilder::new("search").text("query", &query).finish();
            let details = FingerprintBuilder::new("details").text("query", &query).finish();
            prop_assert_ne!(search, details);
        }
    }
}

mod normalization_props {
    use super::*;

    proptest! {
        #[test]
        fn test_doi_normalization_idempotent(doi in r"10\.\d{4,6}/[a-zA-Z0-9._-]{1,20}") {
            let once = normalize_doi(&doi).unwrap();
            prop_assert_eq!(normalize_doi(&once), Some(once.clone()));
            prop_assert_eq!(normalize_doi(&format!("https://doi.org/{doi}")), Some(once));
        }

        #[test]
        fn test_title_normalization_idempotent(title in "[A-Za-z0-9 ,.:;!?'()-]{0,40}") {
            let once = normalize_title(&title);
            prop_assert_eq!(normalize_title(&once), once);
        }
    }
}

mod merge_props {
    use super::*;

    proptest! {
        #[test]
        fn test_merge_is_idempotent(records in prop::collection::vec(raw_record(), 0..12)) {
            let engine = MergeEngine::default();
            let merged = engine.merge(records, MergeStrategy::Union);
            let again = engine.merge_canonical(merged.clone(), MergeStrategy::Union);
            prop_assert_eq!(again, merged);
        }

        #[test]
        fn test_merge_ignores_input_order(records in prop::collection::vec(raw_record(), 0..12)) {
            let engine = MergeEngine::default();
            let mut reversed = records.clone();
            reversed.reverse();

            prop_assert_eq!(
                engine.merge(records, MergeStrategy::Union),
                engine.merge(reversed, MergeStrategy::Union)
            );
        }

        #[test]
        fn test_one_record_per_doi(records in prop::collection::vec(raw_record(), 0..12)) {
            let merged = MergeEngine::default().merge(records, MergeStrategy::Union);
            let mut dois: Vec<&str> = merged.iter().filter_map(|r| r.doi.as_deref()).collect();
            let total = dois.len();
            dois.sort_unstable();
            dois.dedup();
            prop_assert_eq!(dois.len(), total);
        }

        #[test]
        fn test_intersection_within_union(records in prop::collection::vec(raw_record(), 0..12)) {
            let engine = MergeEngine::default();
            let union = engine.merge(records.clone(), MergeStrategy::Union);
            let intersection = engine.merge(records, MergeStrategy::Intersection);

            prop_assert!(intersection.len() <= union.len());
            for record in &intersection {
                prop_assert!(record.sources.len() >= 2);
                prop_assert!(union.contains(record));
            }
        }
    }
}
