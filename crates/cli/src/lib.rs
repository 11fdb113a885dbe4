//! Command-line front end for the Chord ring.
//!
//! Provides commands for:
//! - Running a ring node over TCP
//! - Inspecting a running node
//! - Resolving identifier owners
//! - Reading and writing key bindings through any node

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult, ServeArgs};
pub use config::CliConfig;
