//! Console command parsing
//!
//! Handles the slash commands of the interactive console (`/use`, `/tables`, ...)

pub mod parser;

pub use parser::{Command, HELP, parse_command};
