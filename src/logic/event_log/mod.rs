//! Event Log Module
//!
//! Append-only interaction log (read-only here) and the Temporal Extractor
//! that slices it into time windows.
//!
//! ## Structure
//! - `types`: EventRecord, LogDirection, Extraction, LogQuality
//! - `store`: file reader, direction check, window extraction

pub mod types;
pub mod store;


pub use types::{Actor, EventRecord, Extraction, LogDirection, LogQuality, LogSignal};
pub use store::{is_merge_noise, EventLog};
