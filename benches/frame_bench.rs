//! Frame channel benchmarks.
//!
//! Measures seal/open throughput across the protocol's payload sizes.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use reflex::crypto::{Aead, AeadKey, Nonce, SecureRandom};
use reflex::protocol::{FrameType, Session};

fn bench_seal(c: &mut Criterion) {
    let key = AeadKey::from_bytes([0x42u8; 32]);
    let aead = Aead::new(&key);
    let nonce = Nonce::from_counter(0);

    let mut group = c.benchmark_group("aead_seal");
    for size in [64usize, 256, 1024, 4096, 16384] {
        let plaintext = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| black_box(aead.seal(&nonce, black_box(&plaintext)).unwrap()))
        });
    }
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let key = AeadKey::from_bytes([0x42u8; 32]);
    let aead = Aead::new(&key);
    let nonce = Nonce::from_counter(0);

    let mut group = c.benchmark_group("aead_open");
    for size in [64usize, 1024, 16384] {
        let ciphertext = aead.seal(&nonce, &vec![0u8; size]).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| black_box(aead.open(&nonce, black_box(&ciphertext)).unwrap()))
        });
    }
    group.finish();
}

fn bench_write_frame(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let key: [u8; 32] = SecureRandom::bytes();
    let data = vec![0u8; 1024];

    let mut group = c.benchmark_group("write_frame");
    group.throughput(Throughput::Bytes(1024));
    group.bench_function("1KB", |b| {
        b.iter(|| {
            rt.block_on(async {
                let session = Session::new(&key).unwrap();
                let mut buf = Vec::with_capacity(2048);
                session
                    .write_frame(&mut buf, FrameType::Data, &data)
                    .await
                    .unwrap();
                black_box(buf)
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_seal, bench_open, bench_write_frame);
criterion_main!(benches);
