//! Docintake Storage Library
//!
//! Storage abstraction for ingested artifacts and the local filesystem backend.
//!
//! # Storage key layout
//!
//! Keys are relative and partitioned by area: `unprocessed/` for intake, `duplicates/`
//! for relocated duplicate uploads and `processed/{kind}/{yyyy}/{mm}/{dd}/` for allocated
//! documents. Key generation lives in [`keys`] so every caller stays consistent.

pub mod keys;
pub mod local;
pub mod resolver;
pub mod traits;

pub use local::LocalStorage;
pub use resolver::{candidate_keys, resolve_existing, ResolutionStrategy, DEFAULT_STRATEGIES};
pub use traits::{Storage, StorageError, StorageResult};
