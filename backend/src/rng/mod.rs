//! Deterministic random number generation
//!
//! Uses the mulberry32 xorshift-multiply step over 32-bit state.
//! CRITICAL: Every stochastic decision in the simulator MUST go through this module.

mod mulberry;

pub use mulberry::{hash_seed, Seed, SeededRng};
