// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sources for the per-buffer word count.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::VecDeque;

/// Bounded pseudo-random draws.
pub trait WordSource: Send {
    /// Return a value in `[0, bound)`. `bound` is at least 1.
    fn draw(&mut self, bound: u32) -> u32;
}

/// Draw until the source yields a nonzero word count.
///
/// Terminates for any `bound >= 2`; the controls refuse smaller bounds.
pub fn draw_nonzero<W: WordSource + ?Sized>(source: &mut W, bound: u32) -> u32 {
    debug_assert!(bound >= 2, "bound {} cannot yield a nonzero draw", bound);
    loop {
        let words = source.draw(bound);
        if words != 0 {
            return words;
        }
        tracing::trace!("Rejected zero-sized draw");
    }
}

/// Seeded ChaCha20 draws, reduced modulo the bound.
#[derive(Clone, Debug)]
pub struct SeededWords {
    rng: ChaCha20Rng,
    seed: u64,
}

impl SeededWords {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed from the thread RNG. The chosen seed is available through [`SeededWords::seed`].
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl WordSource for SeededWords {
    fn draw(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.rng.next_u32() % bound
    }
}

/// Replays a fixed list of draws, then continues from a seeded source.
#[derive(Clone, Debug)]
pub struct ScriptedWords {
    script: VecDeque<u32>,
    fallback: SeededWords,
}

impl ScriptedWords {
    pub fn new<I: IntoIterator<Item = u32>>(draws: I) -> Self {
        Self {
            script: draws.into_iter().collect(),
            fallback: SeededWords::new(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl WordSource for ScriptedWords {
    fn draw(&mut self, bound: u32) -> u32 {
        match self.script.pop_front() {
            Some(v) if bound > 0 => v % bound,
            Some(_) => 0,
            None => self.fallback.draw(bound),
        }
    }
}
