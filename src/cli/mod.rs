pub mod commands;
pub mod output;
pub mod suggest;

pub use commands::{CliArgs, Commands};
pub use output::{OutputFormat, OutputFormatter};
