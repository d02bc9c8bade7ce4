//! Explicit build context.
//!
//! Every random draw made while constructing a model comes from the
//! [`BuildContext`] passed to the builder, so building twice from the same
//! seed yields identical parameters and concurrent builds never share state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 2019;

/// Seeded source of randomness for one model build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    seed: u64,
    rng: StdRng,
}

impl BuildContext {
    /// Fresh context seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed the context was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for parameter initialization.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draws a seed for a component that owns its own random stream, such as
    /// a dropout layer.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
