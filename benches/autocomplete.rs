use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use stockdex::{fetcher_fn, row, Directory, DirectoryConfig, PrefixIndex, Row};

// Synthetic listing: 26 * 26 * 8 names sharing short prefixes, like an exchange symbol list.
fn names() -> Vec<String> {
    let mut out = Vec::with_capacity(26 * 26 * 8);
    for a in b'a'..=b'z' {
        for b in b'a'..=b'z' {
            for suffix in ["industries", "infra", "finance", "motors", "steel", "pharma", "tech", "power"] {
                out.push(format!("{}{} {suffix}", a as char, b as char));
            }
        }
    }
    out
}

fn bench_index_build(c: &mut Criterion) {
    let names = names();
    let mut group = c.benchmark_group("index_build");
    group.throughput(Throughput::Elements(names.len() as u64));
    group.bench_function("insert_all", |b| {
        b.iter(|| {
            let mut index = PrefixIndex::new();
            for name in &names {
                index.insert(name);
            }
            black_box(index.len())
        });
    });
    group.finish();
}

fn bench_autocomplete(c: &mut Criterion) {
    let mut index = PrefixIndex::new();
    for name in names() {
        index.insert(&name);
    }

    c.bench_function("autocomplete/exact_prefix", |b| {
        b.iter(|| black_box(index.autocomplete(black_box("ke"))));
    });
    c.bench_function("autocomplete/typo_fallback", |b| {
        b.iter(|| black_box(index.autocomplete(black_box("kez"))));
    });
    c.bench_function("autocomplete/miss", |b| {
        b.iter(|| black_box(index.autocomplete(black_box("0"))));
    });
}

fn bench_find_matches(c: &mut Criterion) {
    c.bench_function("directory/find_matches_limit_5", |b| {
        b.iter_custom(|iters| {
            // Rows carry no URL, so load does not touch the worker pool.
            let directory = Directory::new(DirectoryConfig::default(), fetcher_fn(|_| Ok(String::new())));
            let rows: Vec<Row> = names().into_iter().map(|n| row([("Name", n)])).collect();
            directory.load(rows);

            let start = Instant::now();
            for _ in 0..iters {
                black_box(directory.find_matches(black_box("ke"), 5));
            }
            start.elapsed()
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(3));
    targets = bench_index_build, bench_autocomplete, bench_find_matches
}
criterion_main!(benches);
