//! Item names: short random codes over a curated alphabet.
//!
//! Names are meant to be typed from a shared URL, so the alphabet drops glyphs that are
//! easy to confuse (`1lI`, `0O`, `8B`, `5S`) and characters with a meaning in paths or
//! view dispatch (`+`, `/`). Older items may still carry a 36 character UUID-style name.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default length of freshly allocated names.
pub const NAME_LENGTH: usize = 8;

/// Symbols used for generated names, in ascending order.
pub const ALPHABET: &str = "234679ACDEFGHJKLMNPQRTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("no unique names available up to length {max_length}")]
    Exhausted { max_length: usize },

    #[error("alphabet must have at least 2 symbols")]
    InvalidAlphabet,
}

/// Encode `x` as exactly `length` symbols of `alphabet`, most significant first.
///
/// Shorter results are left-padded with the first symbol. Digits that do not fit into
/// `length` symbols are dropped, so the output length never varies.
pub fn encode(mut x: u128, length: usize, alphabet: &[char]) -> Result<String, NameError> {
    let base = alphabet.len() as u128;
    if base < 2 {
        return Err(NameError::InvalidAlphabet);
    }

    let mut code = Vec::with_capacity(length);
    while x > 0 && code.len() < length {
        code.push(alphabet[(x % base) as usize]);
        x /= base;
    }
    code.resize(length, alphabet[0]);
    Ok(code.into_iter().rev().collect())
}

/// A validated item name, safe to use as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName(String);

impl ItemName {
    /// Validate a name coming from outside (URL, token, CLI argument).
    pub fn parse(s: &str) -> Result<Self, crate::StoreError> {
        if is_short_code(s) || is_legacy_uuid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::StoreError::InvalidName(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn is_short_code(s: &str) -> bool {
    !s.is_empty() && s.len() <= 2 * NAME_LENGTH && s.chars().all(|c| ALPHABET.contains(c))
}

/// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` over `[a-z0-9]`.
fn is_legacy_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups.iter().zip(lengths).all(|(group, len)| {
            group.len() == len
                && group
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemName {
    type Err = crate::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemName {
    type Error = crate::StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.0
    }
}

impl AsRef<str> for ItemName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Picks unused item names.
///
/// Tries `max_tries` random names at the current length, then grows the length by one,
/// up to `max_length`.
#[derive(Debug)]
pub struct NameAllocator {
    rng: Mutex<StdRng>,
    alphabet: Vec<char>,
    length: usize,
    max_length: usize,
    max_tries: usize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Allocator with a reproducible sequence of names.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            alphabet: ALPHABET.chars().collect(),
            length: NAME_LENGTH,
            max_length: 2 * NAME_LENGTH,
            max_tries: 10,
        }
    }

    pub fn with_limits(mut self, length: usize, max_length: usize, max_tries: usize) -> Self {
        self.length = length;
        self.max_length = max_length;
        self.max_tries = max_tries;
        self
    }

    /// Return a name for which `exists` reports false.
    pub fn allocate(&self, exists: impl Fn(&str) -> bool) -> Result<ItemName, NameError> {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for length in self.length..=self.max_length {
            for _ in 0..self.max_tries {
                let name = self.make_id(&mut rng, length)?;
                if !exists(&name) {
                    return Ok(ItemName(name));
                }
            }
            tracing::debug!(name.length = length, "name length exhausted, growing");
        }

        Err(NameError::Exhausted {
            max_length: self.max_length,
        })
    }

    fn make_id(&self, rng: &mut StdRng, length: usize) -> Result<String, NameError> {
        let base = self.alphabet.len() as u128;
        let upper = base.checked_pow(length as u32).unwrap_or(u128::MAX);
        let x = rng.gen_range(0..upper);
        encode(x, length, &self.alphabet)
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new()
    }
}
