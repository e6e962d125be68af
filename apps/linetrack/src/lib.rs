//! # linetrack
//!
//! Library side of the linetrack binary: CLI commands, configuration
//! loading and the live monitor loop. Exposed so integration tests can
//! drive commands without spawning a process.

pub mod cli;
pub mod config;
pub mod monitor;
