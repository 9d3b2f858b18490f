//! Benchmarks for the prediction path.
//!
//! Run with: cargo bench --bench attribution_bench

use std::io::Cursor;

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use corrode_core::{ImportanceMap, TargetLayer, N_CLASSES};
use corrode_explain::{AttributionConfig, AttributionEngine};
use corrode_models::ResNetConfig;
use corrode_vision::{Compositor, Preprocessor};

type BenchBackend = Autodiff<NdArray>;

/// Create a synthetic photo.
fn synthetic_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

fn encode_jpeg(image: &RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");
    let preprocessor = Preprocessor::default();

    for side in [224u32, 640, 1280].iter() {
        let bytes = encode_jpeg(&synthetic_image(*side, *side, 42));
        group.bench_with_input(BenchmarkId::new("decode_resize_normalize", side), side, |b, _| {
            b.iter(|| black_box(preprocessor.preprocess(black_box(&bytes)).unwrap()))
        });
    }

    group.finish();
}

fn bench_attribution(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribution");
    group.sample_size(10);

    let device = <BenchBackend as Backend>::Device::default();
    let model = ResNetConfig::resnet18(N_CLASSES)
        .init::<BenchBackend>(&device)
        .no_grad();

    let preprocessed = Preprocessor::default()
        .preprocess(&encode_jpeg(&synthetic_image(320, 240, 7)))
        .unwrap();

    for layer in TargetLayer::ALL {
        let engine = AttributionEngine::new(AttributionConfig::default().with_layer(layer));
        group.bench_with_input(BenchmarkId::new("resnet18", layer), &layer, |b, _| {
            b.iter(|| {
                let input = preprocessed.to_tensor::<BenchBackend>(&device);
                black_box(engine.attribute(&model, input, None).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    let compositor = Compositor::default();
    let original = synthetic_image(640, 480, 3);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for grid in [7usize, 14, 28].iter() {
        let map = ImportanceMap::new(Array2::from_shape_fn((*grid, *grid), |_| rng.gen::<f32>()))
            .unwrap();
        group.bench_with_input(BenchmarkId::new("jet_blend", grid), grid, |b, _| {
            b.iter(|| black_box(compositor.composite(black_box(&original), &map)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_attribution, bench_composite);
criterion_main!(benches);
