//! # Logbook Testkit
//!
//! Test utilities shared by the logbook crates:
//!
//! - tempdir-backed journal fixtures,
//! - proptest generators for entries and batches,
//! - raw-file corruption helpers for crash and recovery tests.
//!
//! The corruption helpers work at the file level because that is the
//! engine's real failure surface: a crash or a bad disk leaves torn bytes,
//! not torn data structures.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod corrupt;
pub mod fixtures;
pub mod generators;

pub use corrupt::*;
pub use fixtures::*;
pub use generators::*;
