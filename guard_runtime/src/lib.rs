//! Command surface shared by the tick_guard server and its tooling.
//!
//! Kept free of any host or engine dependency so that consoles and test
//! harnesses can build and parse administrative commands without pulling in
//! the control loops from `core_guard`.

pub mod command_text;
pub mod commands;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::{CommandPayload, SpawnKind, TpsOverride, HELP_LINES};
