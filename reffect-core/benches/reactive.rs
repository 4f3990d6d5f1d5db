//! Benchmarks for the reactive primitives.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use reffect_core::reactive::{Effect, Ref};

fn bench_cell(c: &mut Criterion) {
    c.bench_function("ref_get_untracked", |b| {
        let cell = Ref::new(0u64);
        b.iter(|| black_box(cell.get_untracked()));
    });

    c.bench_function("ref_set_no_observers", |b| {
        let cell = Ref::new(0u64);
        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            cell.set(black_box(next));
        });
    });
}

fn bench_effect(c: &mut Criterion) {
    c.bench_function("effect_rerun_one_dependency", |b| {
        let cell = Ref::new(0u64);
        let cell_in_body = cell.clone();
        let effect = Effect::new(move || {
            black_box(cell_in_body.get());
        });
        effect.invoke();

        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            cell.set(next);
        });
    });

    c.bench_function("effect_invoke_rebuilds_dependencies", |b| {
        let cells: Vec<Ref<u64>> = (0..8).map(Ref::new).collect();
        let cells_in_body = cells.clone();
        let effect = Effect::new(move || {
            let mut total = 0;
            for cell in &cells_in_body {
                total += cell.get();
            }
            black_box(total);
        });

        b.iter(|| effect.invoke());
    });
}

criterion_group!(benches, bench_cell, bench_effect);
criterion_main!(benches);
