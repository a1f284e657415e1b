//! Human-presentable ticket codes.
//!
//! Codes are drawn from an alphabet without look-alike symbols (no `0/O`,
//! `1/I`), so they survive being read aloud at a venue door. Twelve symbols
//! from a 32-symbol alphabet give 60 bits per code, which keeps collisions
//! rare enough that the minter's bounded retry is practically never exercised.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbols a code may contain.
pub const CODE_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Default code length.
pub const DEFAULT_CODE_LENGTH: usize = 12;

/// A unique, fixed-length ticket code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketCode(String);

impl TicketCode {
    /// Wraps a code read back from storage.
    #[must_use]
    pub const fn from_string(code: String) -> Self {
        Self(code)
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate ticket codes.
///
/// Implementations need not guarantee uniqueness; the store's unique
/// constraint is the arbiter and the minter retries on collision.
pub trait CodeGenerator: Send + Sync {
    /// Produce one candidate code.
    fn generate(&self) -> TicketCode;
}

/// Random codes from [`CODE_ALPHABET`].
#[derive(Clone, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    /// Creates a generator producing codes of `length` symbols.
    #[must_use]
    pub const fn new(length: usize) -> Self {
        Self { length }
    }

    /// Configured code length
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> TicketCode {
        let mut rng = rand::thread_rng();
        let code = (0..self.length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        TicketCode(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_have_fixed_length_and_known_symbols() {
        let generator = RandomCodeGenerator::default();
        for _ in 0..200 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), DEFAULT_CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn alphabet_has_no_look_alikes() {
        for ambiguous in [b'0', b'O', b'1', b'I'] {
            assert!(!CODE_ALPHABET.contains(&ambiguous));
        }
    }

    #[test]
    fn codes_do_not_repeat_in_practice() {
        let generator = RandomCodeGenerator::default();
        let codes: HashSet<_> = (0..10_000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 10_000);
    }
}
