//! Inefficiency Engine
//!
//! Mines an append-only interaction log for recurring inefficiencies,
//! scores them, and turns the confident ones into remediation artifacts
//! registered in a central index.

pub mod api;
pub mod constants;
pub mod error;
pub mod logic;

pub use error::{EngineError, EngineResult};
