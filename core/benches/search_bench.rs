use criterion::{criterion_group, criterion_main, Criterion};
use scout_core::tokenizer::ngrams;
use scout_core::{Corpus, EngineConfig, RawDocument, SearchIndex};

const ROLES: [&str; 6] = ["engineer", "analyst", "designer", "manager", "scientist", "nurse"];
const TOPICS: [&str; 8] = ["rust", "python", "cloud", "data", "security", "mobile", "kitchen", "patient"];

fn synthetic_corpus(n: usize) -> Corpus {
    let records = (0..n)
        .map(|i| {
            let role = ROLES[i % ROLES.len()];
            let topic = TOPICS[(i * 7) % TOPICS.len()];
            let other = TOPICS[(i * 3 + 1) % TOPICS.len()];
            RawDocument {
                title: format!("{topic} {role} {i}"),
                description: format!("work on {topic} and {other} projects as a {role} in team {}", i % 13),
                skills: Some(vec![topic.to_string(), other.to_string()]),
                salary_min: Some(40_000 + (i as u64 % 9) * 10_000),
                salary_max: Some(60_000 + (i as u64 % 9) * 12_000),
                experience_level: None,
                company: None,
                location: None,
            }
        })
        .collect();
    Corpus::new(records)
}

fn bench_search(c: &mut Criterion) {
    let index = SearchIndex::build(synthetic_corpus(2_000), EngineConfig::default());
    c.bench_function("search_two_terms", |b| b.iter(|| index.search("rust security")));
    c.bench_function("map_for_job", |b| b.iter(|| index.map_for_job(17)));
}

fn bench_tokenize(c: &mut Criterion) {
    let text = synthetic_corpus(50).blobs().join(" ");
    c.bench_function("ngrams_50_postings", |b| b.iter(|| ngrams(&text, 2)));
}

fn bench_build(c: &mut Criterion) {
    let corpus = synthetic_corpus(300);
    let mut group = c.benchmark_group("precompute");
    group.sample_size(10);
    group.bench_function("build_300", |b| b.iter(|| SearchIndex::build(corpus.clone(), EngineConfig::default())));
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_search, bench_build);
criterion_main!(benches);
