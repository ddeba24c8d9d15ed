use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use research_aggregator::{FingerprintBuilder, MergeEngine, RawRecord, Strategy};

const SOURCES: [&str; 5] = ["europe_pmc", "pubmed", "crossref", "openalex", "arxiv"];

/// Every source returns the same `works`, with DOIs missing on a third of them
fn candidates(works: usize) -> Vec<RawRecord> {
    SOURCES
        .iter()
        .flat_map(|source| {
            (0..works).map(move |i| RawRecord {
                title: Some(format!("Effect {i} of something on something else")),
                authors: vec![format!("Author{i} Smith"), "Second Author".to_string()],
                doi: (i % 3 != 0).then(|| format!("10.1000/work.{i}")),
                publication_date: Some(format!("{}-01-01", 2000 + i % 24)),
                citation_count: Some(i as u64),
                ..RawRecord::new(*source)
            })
        })
        .collect()
}

fn benchmark_merge(c: &mut Criterion) {
    let engine = MergeEngine::default();
    let mut group = c.benchmark_group("merge");
    for works in [10, 100, 500] {
        let records = candidates(works);
        group.bench_with_input(BenchmarkId::new("union", works), &records, |b, records| {
            b.iter(|| engine.merge(black_box(records.clone()), Strategy::Union));
        });
        group.bench_with_input(
            BenchmarkId::new("intersection", works),
            &records,
            |b, records| {
                b.iter(|| engine.merge(black_box(records.clone()), Strategy::Intersection));
            },
        );
    }
    group.finish();
}

fn benchmark_fingerprint(c: &mut Criterion) {
    c.bench_function("search_fingerprint", |b| {
        b.iter(|| {
            FingerprintBuilder::new("search")
                .text("query", black_box("  CRISPR   gene editing in plants "))
                .set("sources", black_box(SOURCES))
                .field("max_results", 50)
                .field("strategy", Strategy::Union)
                .finish()
        });
    });
}

criterion_group!(benches, benchmark_merge, benchmark_fingerprint);
criterion_main!(benches);
