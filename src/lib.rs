//! Core library behind the `fileshare` binary: the three-way sync engine.
//!
//! The CLI (`src/main.rs`, `src/cli/`) is a thin shell around this
//! crate; everything that can be unit-tested without a terminal lives
//! here.

pub mod core;
pub mod transport;
