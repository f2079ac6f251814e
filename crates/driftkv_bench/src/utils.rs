//! Benchmark utilities.

use rand::Rng;

/// Generate a random printable value of the specified size.
pub fn random_value(size: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen_range('a'..='z')).collect()
}

/// Generate sequential benchmark keys.
pub fn generate_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("bench_key_{i}")).collect()
}
