//! Cipher and relay benchmarks.
//!
//! Chunks are the relay's read size, so these numbers are per read.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use shadowrelay::cipher::{Base64Cipher, ByteMapCipher, Cipher, NopCipher};
use shadowrelay::connection::buffer_pool::DEFAULT_BUFFER_SIZE;
use shadowrelay::connection::{tunnel, SecureStream};

fn ciphers() -> Vec<Arc<dyn Cipher>> {
    vec![
        Arc::new(NopCipher::new()),
        Arc::new(ByteMapCipher::from_seed(1)),
        Arc::new(Base64Cipher::new()),
    ]
}

fn bench_encrypt(c: &mut Criterion) {
    let chunk = vec![0xa5u8; DEFAULT_BUFFER_SIZE];

    let mut group = c.benchmark_group("encrypt");
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    for cipher in ciphers() {
        group.bench_with_input(BenchmarkId::from_parameter(cipher.name()), &chunk, |b, chunk| {
            b.iter(|| black_box(cipher.encrypt(chunk).unwrap()))
        });
    }

    group.finish();
}

fn bench_decrypt(c: &mut Criterion) {
    let chunk = vec![0xa5u8; DEFAULT_BUFFER_SIZE];

    let mut group = c.benchmark_group("decrypt");
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    for cipher in ciphers() {
        let wire = cipher.encrypt(&chunk).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(cipher.name()), &wire, |b, wire| {
            b.iter(|| black_box(cipher.decrypt(wire).unwrap()))
        });
    }

    group.finish();
}

fn bench_table_generation(c: &mut Criterion) {
    c.bench_function("table_generation", |b| b.iter(ByteMapCipher::random));
}

fn bench_tunnel(c: &mut Criterion) {
    const PAYLOAD: usize = 256 * 1024;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let cipher: Arc<dyn Cipher> = Arc::new(ByteMapCipher::from_seed(1));
    let payload = vec![0x5au8; PAYLOAD];

    let mut group = c.benchmark_group("tunnel");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("table_256k", |b| {
        b.to_async(&rt).iter(|| {
            let cipher = Arc::clone(&cipher);
            let payload = payload.clone();
            async move {
                let (enc_local, mut relay) = duplex(64 * 1024);
                let (plain_local, mut app) = duplex(64 * 1024);
                let handle = tokio::spawn(tunnel(
                    SecureStream::new(enc_local, cipher),
                    SecureStream::new(plain_local, Arc::new(NopCipher::new())),
                ));

                let writer = tokio::spawn(async move {
                    app.write_all(&payload).await.unwrap();
                    app
                });

                let mut received = vec![0u8; PAYLOAD];
                relay.read_exact(&mut received).await.unwrap();
                drop(writer.await.unwrap());
                handle.await.unwrap().unwrap();
                black_box(received)
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encrypt,
    bench_decrypt,
    bench_table_generation,
    bench_tunnel,
);

criterion_main!(benches);
