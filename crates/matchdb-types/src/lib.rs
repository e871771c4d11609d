//! Foundation types for matchdb.
//!
//! This crate provides the identity, payload, and progress types used
//! throughout the matchdb system. Every other matchdb crate depends on
//! `matchdb-types`.
//!
//! # Key Types
//!
//! - [`LongKey`] — 64-bit identity derived deterministically from a string key
//! - [`TypeTag`] — opaque category identifier for stored records
//! - [`StoredRecord`] — (type tag, payload bytes) pair, the unit of storage
//! - [`MatchRecord`] — encode/decode boundary for serializable record types
//! - [`Progress`] — cooperative cancellation and progress reporting

pub mod error;
pub mod key;
pub mod matches;
pub mod progress;
pub mod record;

pub use error::TypeError;
pub use key::LongKey;
pub use matches::{PeptideMatch, ProteinMatch, Spectrum, SpectrumMatch};
pub use progress::{CancelFlag, Never, Progress};
pub use record::{MatchRecord, StoredRecord, TypeTag};
