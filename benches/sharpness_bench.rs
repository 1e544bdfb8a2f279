//! Benchmarks for the blur metric and region blur

use brandscrub::{BoundingBox, MaskEngine, MaskOptions, Photograph, SharpnessScorer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};

fn product_photo(size: u32) -> Photograph {
    Photograph::from_rgb(RgbImage::from_fn(size, size, |x, y| {
        let v = ((x * 7 + y * 13) % 256) as u8;
        Rgb([v, v.wrapping_add(40), 255 - v])
    }))
}

fn bench_sharpness(c: &mut Criterion) {
    let mut group = c.benchmark_group("sharpness");
    for size in [256u32, 1024] {
        let photo = product_photo(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &photo, |b, photo| {
            b.iter(|| SharpnessScorer::score(black_box(photo)))
        });
    }
    group.finish();
}

fn bench_region_blur(c: &mut Criterion) {
    let photo = product_photo(1024);
    let engine = MaskEngine::new(MaskOptions::default());
    let regions = [
        BoundingBox::new(100, 100, 200, 120),
        BoundingBox::new(600, 700, 300, 200),
    ];

    c.bench_function("region_blur_two_boxes", |b| {
        b.iter(|| engine.apply_region_blur(black_box(&photo), black_box(&regions)))
    });
}

criterion_group!(benches, bench_sharpness, bench_region_blur);
criterion_main!(benches);
