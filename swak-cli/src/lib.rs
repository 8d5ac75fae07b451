//! Swak command-line driver.
//!
//! The binary in `main.rs` parses arguments, loads configuration, installs
//! logging and dispatches to one handler in [`commands`].

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
