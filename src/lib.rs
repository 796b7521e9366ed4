//! # Picstash
//!
//! On-demand image derivatives with a content-addressed cache. A request names
//! a source image (a path in the source storage, or a URL) and a list of
//! operations; the first request computes the derivative, later ones are
//! served from the destination storage.
//!
//! # Architecture: Fingerprint, Index, Store
//!
//! ```text
//! params ─► fingerprint ─► index lookup ─┬─ hit  ─► destination storage
//!                                        └─ miss ─► load source ─► engine ─► store + index
//! ```
//!
//! - **Fingerprint**: the MD5 of the canonical request parameters
//!   (the signature excluded). The same parameters always yield the same key.
//! - **Index**: a key-value store mapping each key to the sharded path of its
//!   derivative, plus one children set per source image for cascade delete.
//! - **Store**: derivatives are written under `aa/bb/<rest>.<ext>` shards of
//!   their key so no directory grows without bound.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`processor`] | Cache-or-compute pipeline: lookup, load, transform, persist |
//! | [`cascade`] | Delete a source image together with its cached derivatives |
//! | [`parameters`] | Request parameters and their translation into engine operations |
//! | [`imaging`] | Operation model, backend trait, native and gifsicle backends, engine |
//! | [`cache`] | Fingerprinting, shard paths, children-set keys, hit/miss counters |
//! | [`storage`] | Blob storage trait with filesystem and in-memory drivers |
//! | [`index`] | Key-value index trait: in-memory, prefixed, replica fallback |
//! | [`fetch`] | HTTP source loading for URL requests |
//! | [`file`] | `ImageFile`: a blob with its path, headers and storage handle |
//! | [`context`] | Wires storages, index, engine and settings together |
//! | [`config`] | `picstash.toml` loading, stock defaults, validation |
//! | [`metrics`] | Stage timing hooks |
//! | [`error`] | Crate error with a kind per failure class |
//! | [`types`] | Image formats and their extensions and content types |
//!
//! # Design Decisions
//!
//! ## Backends Chosen By Output Type
//!
//! Each backend declares the formats it can produce. For every stage the
//! engine tries the matching backends in weight order and falls through on
//! [`imaging::BackendError::NotImplemented`]. The native backend handles
//! every format; gifsicle, when installed, takes over animated GIF output so
//! frames survive a resize.
//!
//! ## Stale Index Entries Heal Themselves
//!
//! An index entry whose blob is gone is treated as a miss: the derivative is
//! recomputed and the entry overwritten. Nothing ever needs to rebuild the
//! index by hand.
//!
//! ## Optional Background Persistence
//!
//! With `async_persist` the caller gets the derivative as soon as it is
//! computed, and the write happens on a background task bounded by
//! `persist_timeout_ms`. [`processor::Processor::flush`] waits for those tasks.

pub mod cache;
pub mod cascade;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod file;
pub mod imaging;
pub mod index;
pub mod metrics;
pub mod parameters;
pub mod processor;
pub mod storage;
pub mod types;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_helpers;
