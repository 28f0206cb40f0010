//! Deterministic named RNG streams.
//!
//! Every stochastic engine draws from its own named stream so that adding a
//! stage (or reordering draws inside one) never perturbs the draws of
//! another. A stream's seed depends only on the root seed and the stream
//! name, so `loan_gen/green` produces the same sequence whether or not the
//! exit simulator ran first.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// splitmix64 finalizer. Decorrelates nearby seeds (path 0 vs path 1).
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// FNV-1a over the stream name.
fn fnv1a(name: &str) -> u64 {
    let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
    for b in name.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

/// Derive the seed for Monte Carlo path `p` from the root seed.
pub fn path_seed(root_seed: u64, path: usize) -> u64 {
    root_seed ^ splitmix64(path as u64 + 1)
}

/// Factory for named deterministic streams, one per simulation path.
#[derive(Debug, Clone, Copy)]
pub struct RngFactory {
    seed: u64,
}

impl RngFactory {
    pub fn new(seed: u64) -> Self {
        RngFactory { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// An independent stream for `name`, e.g. `"price_path/zone/green"`.
    pub fn stream(&self, name: &str) -> StdRng {
        StdRng::seed_from_u64(splitmix64(self.seed ^ fnv1a(name)))
    }
}
