//! Shared helpers for the enfproof binaries

pub mod output;
