//! Cross-cycle behavior of the reusable gzip writer

use flate2::read::GzDecoder;
use kiln_compression::ReusableGzip;
use std::io::Read;

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

fn sample(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn test_two_cycles_on_same_instance() {
    let mut gzip = ReusableGzip::new();

    let first = sample(50_000, 7);
    let second = b"short second body".to_vec();

    let a = gzip.compress(&first).unwrap();
    let b = gzip.compress(&second).unwrap();

    assert_eq!(gunzip(&a), first);
    assert_eq!(gunzip(&b), second);
}

#[test]
fn test_reused_output_matches_fresh_instance() {
    let body = sample(10_000, 3);

    let mut reused = ReusableGzip::new();
    reused.compress(b"warm-up body that leaves state behind").unwrap();
    let from_reused = reused.compress(&body).unwrap();

    let mut fresh = ReusableGzip::new();
    let from_fresh = fresh.compress(&body).unwrap();

    assert_eq!(from_reused, from_fresh);
}

#[test]
fn test_high_level_then_reset_matches_default() {
    let body = b"level should not survive a reset".repeat(64);

    let mut gzip = ReusableGzip::new();
    gzip.reset();
    gzip.set_level(9).unwrap();
    gzip.write(&body).unwrap();
    let high = gzip.finish().unwrap().to_vec();
    assert_eq!(gunzip(&high), body);

    let after = gzip.compress(&body).unwrap();
    let mut fresh = ReusableGzip::new();
    assert_eq!(after, fresh.compress(&body).unwrap());
}

#[test]
fn test_large_incompressible_body() {
    // Pseudo-random bytes force deflate to emit more than one chunk of output
    let mut state: u32 = 0x1234_5678;
    let body: Vec<u8> = (0..200_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();

    let mut gzip = ReusableGzip::new();
    let out = gzip.compress(&body).unwrap();
    assert_eq!(gunzip(&out), body);
}
