//! Cryptographic primitives for ticket signing and key handling.

pub mod digest;
pub mod freshness;
pub mod signing;
pub mod token;
