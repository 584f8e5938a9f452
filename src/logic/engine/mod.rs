//! Engine Module - pipeline orchestration
//!
//! ## Structure
//! - `report`: DetectReport, Detection, RunSummary
//! - `runner`: Engine (detect, generate, audit, cycle)
//! - `setup`: data directory scaffolding, approval queue and candidate store

pub mod report;
pub mod runner;
pub mod setup;


pub use report::{DetectReport, Detection, PatternFailure, RunSummary};
pub use runner::Engine;
pub use setup::{approval_queue, candidate_store, init_data_dir};
