//! API Module
//!
//! Command layer between the CLI and the engine.
//!
//! Structure:
//! - commands.rs: one function per subcommand, returning exit code + output

pub mod commands;

pub use commands::*;
