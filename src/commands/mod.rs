//! Console command handlers
//!
//! This module contains the command handlers that drive a session from
//! line-oriented input.

pub mod console;
pub mod session;

pub use console::{print_events, run_console};
pub use session::{dispatch, parse, ConsoleCommand, ParseError};
