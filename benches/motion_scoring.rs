//! Benchmarks for the frame analysis hot path
//!
//! This benchmark measures:
//! - Motion scoring speed at common analysis resolutions
//! - Debug mask generation overhead
//! - Rolling window bookkeeping per frame
//! - Raw frame slicing throughput

use bytes::BytesMut;
use clipsieve::motion::{motion_mask, motion_score, MotionWindow};
use clipsieve::pipeline::RawFrameCodec;
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use tokio_util::codec::Decoder;

/// Analysis sizes after the default downscale: 720p and 1080p sources at
/// resize factors 0.5 and 0.25.
const SIZES: &[(u32, u32)] = &[(320, 180), (640, 360), (960, 540)];

/// Deterministic noise so runs are comparable without a rand dependency.
fn synthetic_frame(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

fn bench_motion_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion_score");

    for &(width, height) in SIZES {
        let len = (width * height) as usize;
        let previous = synthetic_frame(len, 7);
        let current = synthetic_frame(len, 11);

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &len,
            |b, _| b.iter(|| motion_score(black_box(&current), black_box(&previous))),
        );
    }

    // Identical frames: no delta ever clears the bar.
    let len = (640 * 360) as usize;
    let frame = synthetic_frame(len, 7);
    group.throughput(Throughput::Bytes(len as u64));
    group.bench_function("640x360_static_scene", |b| {
        b.iter(|| motion_score(black_box(&frame), black_box(&frame)))
    });

    group.finish();
}

fn bench_motion_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion_mask");

    let len = (640 * 360) as usize;
    let previous = synthetic_frame(len, 7);
    let current = synthetic_frame(len, 11);

    group.throughput(Throughput::Bytes(len as u64));
    group.bench_function("640x360", |b| {
        b.iter(|| motion_mask(black_box(&current), black_box(&previous)))
    });

    group.finish();
}

fn bench_motion_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion_window");

    // A minute of observations at 30fps with every fourth frame analyzed.
    let scores: Vec<f64> = (0..450).map(|i| (i % 10) as f64 / 10.0).collect();
    group.throughput(Throughput::Elements(scores.len() as u64));

    group.bench_function("observe_run", |b| {
        b.iter(|| {
            let mut window = MotionWindow::new(0.3);
            let mut active = 0usize;
            for score in black_box(&scores) {
                if window.observe(*score) {
                    active += 1;
                }
            }
            black_box(active)
        })
    });

    group.finish();
}

fn bench_frame_slicing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_slicing");

    let (width, height) = (640u32, 360u32);
    let frame_len = (width * height) as usize;
    let frames = 32usize;
    let stream = synthetic_frame(frame_len * frames, 13);

    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("decode_32_frames", |b| {
        b.iter_batched(
            || BytesMut::from(&stream[..]),
            |mut buf| {
                let mut codec = RawFrameCodec::new(width, height);
                let mut count = 0usize;
                while let Some(frame) = codec.decode(&mut buf).unwrap() {
                    black_box(&frame.data);
                    count += 1;
                }
                black_box(count)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_motion_score,
    bench_motion_mask,
    bench_motion_window,
    bench_frame_slicing,
);
criterion_main!(benches);
