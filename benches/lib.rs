use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::{hint::black_box, time::Duration};

use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use seqforest::feed::{TargetSequence, feed_from_residues};
use seqforest::smith_waterman::{LaneBlock, Penalties};
use seqforest::substitution::{SubstitutionTable, encode_symbols};
use seqforest::{HitRecord, SearchConfig, Searcher, SpanningForest};

const RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

fn gen_protein(rng: &mut StdRng, lengths: &Normal<f64>) -> String {
    let len = lengths.sample(rng).clamp(20.0, 2000.0) as usize;
    (0..len)
        .map(|_| RESIDUES[rng.random_range(0..RESIDUES.len())] as char)
        .collect()
}

fn gen_database(count: u32, seed: u64) -> Vec<(u32, String)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let lengths = Normal::new(350.0, 150.0).unwrap();
    (0..count)
        .map(|id| (id, gen_protein(&mut rng, &lengths)))
        .collect()
}

fn kernel_bench(c: &mut Criterion) {
    let table = SubstitutionTable::named("BLOSUM62", &SearchConfig::default().alphabet).unwrap();
    let mut group = c.benchmark_group("kernel");

    for query_len in [64usize, 256, 1024] {
        let query = encode_symbols("q", &RESIDUES.repeat(query_len / RESIDUES.len() + 1)[..query_len])
            .unwrap();
        let expansion = table.expand(&query);
        let batch = (0..256u32)
            .map(|step| std::array::from_fn(|lane| 1 + ((step as usize * 7 + lane * 3) % 25) as u8))
            .collect::<Vec<[u8; 16]>>();

        // cells updated per iteration
        group.throughput(Throughput::Elements((query_len * batch.len() * 16) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(query_len), &batch, |b, batch| {
            let mut block = LaneBlock::new(query_len);
            let mut completions = vec![];
            b.iter(|| {
                completions.clear();
                block.run(&expansion, black_box(batch), Penalties::default(), 0, &mut completions);
                black_box(block.cumulative());
            })
        });
    }
    group.finish();
}

fn search_bench(c: &mut Criterion) {
    let database = gen_database(2_000, 42);
    let residues = database.iter().map(|(_, s)| s.len()).sum::<usize>();
    let query = database[0].1.clone();

    let mut group = c.benchmark_group("search");
    group.throughput(Throughput::Elements((residues * query.len()) as u64));
    group.measurement_time(Duration::from_secs(10));

    for lanes in [16usize, 64, 256] {
        let searcher = Searcher::new(SearchConfig {
            lanes,
            ..SearchConfig::default()
        })
        .unwrap();
        let targets = database
            .iter()
            .map(|(id, s)| TargetSequence::encode(*id, s.as_bytes()).unwrap())
            .collect::<Vec<_>>();

        group.bench_with_input(BenchmarkId::new("lanes", lanes), &targets, |b, targets| {
            b.iter(|| {
                let mut hits: Vec<HitRecord> = vec![];
                searcher
                    .search(u32::MAX, query.as_bytes(), targets.clone().into_iter(), &mut hits)
                    .unwrap();
                black_box(hits.len())
            })
        });
    }
    group.finish();

    // end to end, including encoding
    c.bench_function("search/encode+score 200", |b| {
        let searcher = Searcher::new(SearchConfig::default()).unwrap();
        let small = &database[..200];
        b.iter(|| {
            let feed = feed_from_residues(small.iter().map(|(id, s)| (*id, s.as_str()))).unwrap();
            let mut hits: Vec<HitRecord> = vec![];
            searcher.search(0, query.as_bytes(), feed, &mut hits).unwrap();
            black_box(hits.len())
        })
    });
}

fn gen_links(nodes: u32, count: usize, seed: u64) -> Vec<HitRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let scores = Normal::new(60.0, 25.0).unwrap();
    (0..count)
        .map(|_| HitRecord {
            query_id: rng.random_range(0..nodes),
            target_id: rng.random_range(0..nodes),
            score: scores.sample(&mut rng).max(1.0) as i32,
            location: 0,
            length: rng.random_range(50..800),
        })
        .collect()
}

fn forest_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    for (nodes, count) in [(1_000u32, 10_000usize), (50_000, 500_000)] {
        let links = gen_links(nodes, count, 7);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("ingest", format!("{nodes}x{count}")),
            &links,
            |b, links| {
                b.iter(|| {
                    let mut forest = SpanningForest::new();
                    forest.ingest_all(links.iter().copied());
                    black_box(forest.total_weight())
                })
            },
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = kernel_bench, search_bench, forest_bench
}
criterion_main!(benches);
