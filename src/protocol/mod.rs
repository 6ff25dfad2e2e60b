//! Protocol data model, wire bodies and client snippets.

pub mod models;
pub mod snippet;
