//! In-process leaky bucket counters.
//!
//! A [`Bucket`] accumulates load, leaks it away at a fixed rate, and rejects
//! growth past its capacity. Draining is computed lazily on access, and the
//! full state (including a partially elapsed interval) can be persisted with
//! [`codec`] and restored in another process.
pub mod bucket;
pub mod cli;
pub mod codec;
pub mod error;
pub mod settings;

pub use bucket::Bucket;
pub use error::{CodecField, LeakyError, Result};
pub use settings::BucketSettings;
