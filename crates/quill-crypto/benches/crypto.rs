use quill_crypto::{derive_key, open, seal_with_fresh_nonce, DerivedKey, KEY_SIZE};
use secrecy::SecretString;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [10_000, 100_000, 600_000], sample_count = 5)]
fn bench_derive_key(bencher: divan::Bencher, iterations: u32) {
    let password = SecretString::from("correct horse battery staple");
    let salt = [0x5Au8; 16];
    bencher.bench(|| {
        derive_key(
            divan::black_box(&password),
            divan::black_box(&salt),
            iterations,
        )
        .unwrap()
    });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_seal(bencher: divan::Bencher, size: usize) {
    let key = DerivedKey::from_bytes([0xABu8; KEY_SIZE]);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            seal_with_fresh_nonce(
                divan::black_box(&key),
                |nonce| nonce.to_vec(),
                divan::black_box(&data),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_open(bencher: divan::Bencher, size: usize) {
    let key = DerivedKey::from_bytes([0xABu8; KEY_SIZE]);
    let data = make_data(size);
    let sealed = seal_with_fresh_nonce(&key, |nonce| nonce.to_vec(), &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            open(
                divan::black_box(&key),
                &sealed.nonce,
                &sealed.aad,
                divan::black_box(&sealed.ciphertext),
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
