//! Registry Index Module
//!
//! Append-only ledger of generated artifacts, rewritten atomically.
//!
//! # Components
//! - `atomic.rs`: temp-file + rename writes, cross-process writer lock
//! - `index.rs`: index document and the Registry Updater

pub mod atomic;
pub mod index;

pub use atomic::{atomic_write, atomic_write_json, LockPolicy, WriterLock};
pub use index::{IndexEntry, RegistryIndex, RegistryUpdater};
