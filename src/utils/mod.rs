//! Utility functions

pub mod random;

pub use random::random_hex;
