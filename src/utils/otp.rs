// src/utils/otp.rs

use rand::{Rng, rngs::OsRng};

/// Generates a uniformly distributed 6-digit code from the OS CSPRNG.
pub fn generate_code() -> String {
    OsRng.gen_range(100_000..=999_999u32).to_string()
}

/// Constant-time comparison of a submitted code against the stored one.
/// Only the length leaks, and both sides are 6 digits in practice.
pub fn codes_match(submitted: &str, expected: &str) -> bool {
    let a = submitted.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
