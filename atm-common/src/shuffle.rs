//! Deterministic per-participant shuffle
//!
//! The presentation order of a participant is a pure function of their id:
//! the seed string is folded into a 32-bit accumulator, mixed once, and used to
//! drive a linear congruential generator feeding a backward Fisher-Yates pass.
//! Any implementation following the same arithmetic produces the same order,
//! so resuming from either store never reorders unseen items.

/// Odd constant mixed into the folded seed
const SEED_MIX: u32 = 0x9e37_79b9;

/// LCG multiplier (Numerical Recipes)
const LCG_MULTIPLIER: u32 = 1_664_525;

/// LCG increment (Numerical Recipes)
const LCG_INCREMENT: u32 = 1_013_904_223;

/// 2^32, the LCG modulus as a float divisor
const LCG_MODULUS: f64 = 4_294_967_296.0;

/// Seeded pseudo-random stream of floats in [0, 1)
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    /// Fold the UTF-16 code units of `seed` through `acc * 33 + unit`
    /// (mod 2^32) and mix the result with [`SEED_MIX`].
    pub fn from_seed(seed: &str) -> Self {
        let folded = seed
            .encode_utf16()
            .fold(0u32, |acc, unit| acc.wrapping_mul(33).wrapping_add(u32::from(unit)));
        Self { state: folded ^ SEED_MIX }
    }

    /// Advance the generator and return the next float in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        f64::from(self.state) / LCG_MODULUS
    }

    /// Draw an index in `0..bound`
    fn next_index(&mut self, bound: usize) -> usize {
        (self.next_f64() * bound as f64).floor() as usize
    }
}

/// Return a permutation of `items` determined entirely by `seed`.
///
/// Empty and single-element inputs come back unchanged.
pub fn shuffle<T: Clone>(seed: &str, items: &[T]) -> Vec<T> {
    let mut shuffled = items.to_vec();
    let mut rng = SeededRandom::from_seed(seed);
    for i in (1..shuffled.len()).rev() {
        let j = rng.next_index(i + 1);
        shuffled.swap(i, j);
    }
    shuffled
}

/// Presentation order for a manifest of `len` items
pub fn shuffled_indices(seed: &str, len: usize) -> Vec<usize> {
    let indices: Vec<usize> = (0..len).collect();
    shuffle(seed, &indices)
}
