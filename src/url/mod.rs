//! URL handling module for Shelf-Scout
//!
//! This module provides URL normalization (the single dedup key used by every
//! frontier), authority extraction, and domain scoping.

mod normalize;
mod scope;

pub use normalize::{normalize, Normalizer};
pub use scope::{authority, matches_wildcard, DomainScope};
