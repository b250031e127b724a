#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod block;

/// Error type for the checked table operations.
pub mod error;

pub mod hash_table;

pub mod hasher;

/// Handles to the raw bytes of individual records.
pub mod record;

/// Deduplication of fixed-size keys on top of [`HashTable`].
pub mod key_set;

/// Per-key accumulation of fixed-size values on top of [`HashTable`].
pub mod aggregator;

pub use aggregator::Aggregator;
pub use error::Error;
pub use hash_table::HashTable;
#[cfg(feature = "stats")]
pub use hash_table::TableStats;
pub use key_set::KeySet;
pub use record::Record;
pub use record::RecordId;
pub use record::RecordMut;
