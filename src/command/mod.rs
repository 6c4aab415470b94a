//! Room administration commands.
//!
//! [`parser`] turns text into a [`Command`], [`processor`] authorizes and
//! runs it.

mod help;
pub mod parser;
pub mod processor;

pub use help::format_help;
pub use parser::{parse, Command};
pub use processor::{
    no_permission, CommandProcessor, Reply, GENERIC_ERROR_REPLY, MAX_INTERJECT_ODDS,
};
