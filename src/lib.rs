//! Testkube executor adapter for the Ply test engine.
//!
//! The host launches us with an execution request; we resolve Ply options,
//! find tests, drive the engine and answer with newline-delimited JSON
//! records on stdout, ending in exactly one `result` record.

pub mod args;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod locator;
pub mod output;
pub mod process;
pub mod runner;
pub mod worker;

pub use error::AdapterError;
