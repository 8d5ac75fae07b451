//! Command handlers -- one module per subcommand

pub mod config;
pub mod desc;
pub mod list;
pub mod validate;
