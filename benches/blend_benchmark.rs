//! Blend pipeline benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgba, RgbaImage};
use retouch_lib::blend::{apply_alpha_mask, feather_edges, merge_tiles, split_image, AlphaMode, FeatherEdges, SplitOutcome};

fn generate_region(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
}

/// Opaque image with a transparent disc in the middle
fn generate_erased(size: u32) -> RgbaImage {
    let center = size as f64 / 2.0;
    let radius = size as f64 / 4.0;
    RgbaImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f64 - center, y as f64 - center);
        if dx * dx + dy * dy <= radius * radius {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

fn benchmark_feather(c: &mut Criterion) {
    let mut group = c.benchmark_group("Edge Feathering");

    for size in [256u32, 512, 1024].iter() {
        let region = generate_region(*size);
        group.bench_with_input(BenchmarkId::new("all_edges", size), &region, |b, region| {
            b.iter(|| {
                let mut image = region.clone();
                feather_edges(&mut image, FeatherEdges::ALL, None);
                image
            })
        });
    }

    group.finish();
}

fn benchmark_alpha_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("Alpha Mask");

    for spread in [4u32, 10, 32].iter() {
        let region = generate_region(512);
        let mask = generate_erased(512);
        group.bench_with_input(BenchmarkId::new("spread", spread), spread, |b, spread| {
            b.iter(|| {
                let mut image = region.clone();
                apply_alpha_mask(&mut image, &mask, AlphaMode::Alpha, *spread).ok();
                image
            })
        });
    }

    group.finish();
}

fn benchmark_tiles(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tiling");

    let image = generate_region(2048);
    group.bench_function("split_2048", |b| b.iter(|| split_image(&image, 512, 32).ok()));

    if let Ok(SplitOutcome::Split(grid)) = split_image(&image, 512, 32) {
        group.bench_function("merge_2048", |b| b.iter(|| merge_tiles(&grid).ok()));
    }

    group.finish();
}

criterion_group!(benches, benchmark_feather, benchmark_alpha_mask, benchmark_tiles);
criterion_main!(benches);
