//! Configuration module for mediapress
//!
//! Handles defaults, loading from the YAML config file, and environment
//! variable overrides. Flags are applied on top by the CLI.

pub mod config;

pub use config::*;
