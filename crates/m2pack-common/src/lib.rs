//! Common utilities for m2pack.
//!
//! This crate provides the foundational pieces shared by the m2pack crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`Error`] - Errors raised while reading binary data

mod error;
mod reader;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};
