//! One-time code generation.
//!
//! RULE: production challenge codes come from the operating system CSPRNG.
//! The seeded source exists so tests can replay a known code sequence; it
//! must never be wired into a live gate.

use rand::{rngs::OsRng, Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::sync::Mutex;

/// Number of digits in an SCA one-time code.
pub const CODE_DIGITS: usize = 6;
const CODE_SPACE: u32 = 1_000_000;

pub trait CodeSource: Send + Sync {
    /// Draw a code in [0, 10^6). Formatting is the caller's concern.
    fn next_code(&self) -> u32;

    fn six_digit_code(&self) -> String {
        format!("{:0width$}", self.next_code() % CODE_SPACE, width = CODE_DIGITS)
    }
}

/// Unpredictable codes from the OS entropy source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCodeSource;

impl CodeSource for OsCodeSource {
    fn next_code(&self) -> u32 {
        OsRng.gen_range(0..CODE_SPACE)
    }
}

/// Deterministic codes for tests and replay tooling.
pub struct SeededCodeSource {
    inner: Mutex<Pcg64Mcg>,
}

impl SeededCodeSource {
    pub fn new(seed: u64) -> Self {
        let derived_seed = seed ^ 0x9e37_79b9_7f4a_7c15;
        Self {
            inner: Mutex::new(Pcg64Mcg::seed_from_u64(derived_seed)),
        }
    }
}

impl CodeSource for SeededCodeSource {
    fn next_code(&self) -> u32 {
        let mut rng = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..CODE_SPACE)
    }
}

/// True when `code` is exactly six ASCII digits.
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}
