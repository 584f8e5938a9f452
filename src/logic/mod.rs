//! Logic Module - detection and remediation engines
//!
//! ## Pipeline
//! - `event_log/` - Event Log Store + Temporal Extractor
//! - `patterns/` - Pattern Registry + Pattern Matcher
//! - `confidence/` - Confidence Scorer + approval gate
//! - `approval` - manual approval queue
//! - `artifact/` - Artifact Generator + templates
//! - `registry_index/` - Registry Index + Registry Updater
//! - `audit/` - Efficiency Auditor + candidate rules
//! - `engine/` - orchestration of one run
//! - `config` - EngineConfig

pub mod event_log;
pub mod patterns;
pub mod confidence;
pub mod approval;
pub mod artifact;
pub mod registry_index;
pub mod audit;
pub mod engine;
pub mod config;
