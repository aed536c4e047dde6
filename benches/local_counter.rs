use std::{hint::black_box, sync::Arc, thread};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use vacancy::{CacheTtlMs, LocalCounter};

fn bench_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_counter/reserve");
    group.sample_size(200);

    group.bench_function("success", |b| {
        let counter = LocalCounter::new(u64::MAX, CacheTtlMs::default());

        b.iter(|| black_box(counter.reserve(black_box(1))));
    });

    group.bench_function("insufficient", |b| {
        let counter = LocalCounter::new(0, CacheTtlMs::default());

        b.iter(|| black_box(counter.reserve(black_box(1))));
    });

    group.bench_function("contended/4_threads", |b| {
        b.iter_batched(
            || Arc::new(LocalCounter::new(u64::MAX, CacheTtlMs::default())),
            |counter| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        let counter = Arc::clone(&counter);
                        thread::spawn(move || {
                            for _ in 0..1_000 {
                                black_box(counter.reserve(1).unwrap());
                            }
                        })
                    })
                    .collect();

                for h in handles {
                    h.join().unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_get_current(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_counter/get_current");
    group.sample_size(200);

    for use_cache in [true, false] {
        group.bench_function(format!("use_cache={use_cache}"), |b| {
            let counter = LocalCounter::new(1_000, CacheTtlMs::from(60_000));

            b.iter(|| black_box(counter.get_current(black_box(use_cache))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reserve, bench_get_current);
criterion_main!(benches);
