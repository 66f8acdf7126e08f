//! mulberry32 random number generator
//!
//! Small 32-bit generator with a xorshift-multiply output function. The bit
//! operations match the published mulberry32 exactly so that a seed produces
//! the same stream on every platform.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. This is CRITICAL for:
//! - Debugging (reproduce an exact simulation day)
//! - Testing (verify behavior)
//! - Deterministic mode (identical cycles across runs)

use serde::{Deserialize, Serialize};

/// Seed accepted by [`SeededRng::from_seed`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    /// Numeric seed, signed values wrap to unsigned 32 bits
    Number(i64),
    /// Text seed, hashed to 32 bits with [`hash_seed`]
    Text(String),
}

impl From<i64> for Seed {
    fn from(value: i64) -> Self {
        Seed::Number(value)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Seed::Number(value as i64)
    }
}

impl From<u32> for Seed {
    fn from(value: u32) -> Self {
        Seed::Number(i64::from(value))
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Seed::Text(value.to_string())
    }
}

impl From<String> for Seed {
    fn from(value: String) -> Self {
        Seed::Text(value)
    }
}

impl Seed {
    /// Resolve the seed to the generator's 32-bit starting state
    pub fn to_state(&self) -> u32 {
        match self {
            Seed::Number(n) => *n as u32,
            Seed::Text(s) => hash_seed(s),
        }
    }
}

/// Hash a string to a 32-bit seed
///
/// `h = h * 31 + code_unit` over UTF-16 code units with wrapping `i32`
/// arithmetic, then the absolute value.
///
/// # Example
/// ```
/// use mockbank_core::rng::hash_seed;
///
/// assert_eq!(hash_seed(""), 0);
/// assert_eq!(hash_seed("a"), 97);
/// assert_eq!(hash_seed("ab"), 97 * 31 + 98);
/// ```
pub fn hash_seed(text: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

/// Deterministic random source
///
/// # Example
/// ```
/// use mockbank_core::rng::SeededRng;
///
/// let mut rng = SeededRng::new(12345);
/// let value = rng.next_f64();
/// assert!((0.0..1.0).contains(&value));
/// let dice = rng.next_int(1, 6); // inclusive
/// assert!((1..=6).contains(&dice));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededRng {
    /// Internal state (32-bit)
    state: u32,
}

impl SeededRng {
    /// Create a new generator from a 32-bit state
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Create a generator from a text or numeric seed
    ///
    /// # Example
    /// ```
    /// use mockbank_core::rng::SeededRng;
    ///
    /// let a = SeededRng::from_seed("demo-bank");
    /// let b = SeededRng::from_seed(String::from("demo-bank"));
    /// assert_eq!(a.state(), b.state());
    /// ```
    pub fn from_seed(seed: impl Into<Seed>) -> Self {
        Self::new(seed.into().to_state())
    }

    /// Current internal state (for checkpointing/replay)
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Next raw 32-bit output
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Next float in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }

    /// Random integer in [min, max] (both inclusive)
    ///
    /// # Panics
    /// Panics if min > max
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        assert!(min <= max, "min must not exceed max");
        let span = (max - min + 1) as f64;
        (self.next_f64() * span).floor() as i64 + min
    }

    /// `base` moved by up to ±`pct` (0.2 = ±20%)
    pub fn next_with_variance(&mut self, base: f64, pct: f64) -> f64 {
        let swing = self.next_f64() * 2.0 - 1.0;
        base * (1.0 + swing * pct)
    }

    /// Uniform float in [min, max)
    pub fn next_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }

    /// True with probability `p`
    pub fn next_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform pick from a slice, `None` when empty
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = (self.next_f64() * items.len() as f64).floor() as usize;
        items.get(index.min(items.len() - 1))
    }

    /// Weighted pick from `(item, weight)` pairs
    ///
    /// Draws one float, then walks the table subtracting weights until the
    /// remainder drops to zero. Returns `None` for an empty table.
    ///
    /// # Example
    /// ```
    /// use mockbank_core::rng::SeededRng;
    ///
    /// let mut rng = SeededRng::new(7);
    /// let table = [("groceries", 0.0), ("dining", 1.0)];
    /// assert_eq!(rng.pick_weighted(&table), Some(&"dining"));
    /// ```
    pub fn pick_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> Option<&'a T> {
        let total: f64 = items.iter().map(|(_, w)| w.max(0.0)).sum();
        let mut remainder = self.next_f64() * total;
        for (item, weight) in items {
            let weight = weight.max(0.0);
            if weight <= 0.0 {
                continue;
            }
            remainder -= weight;
            if remainder <= 0.0 {
                return Some(item);
            }
        }
        items
            .iter()
            .rev()
            .find(|(_, w)| *w > 0.0)
            .or_else(|| items.last())
            .map(|(item, _)| item)
    }
}
