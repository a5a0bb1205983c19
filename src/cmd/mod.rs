//! CLI subcommand implementations.

mod analyze_cmd;
mod compare_cmd;
mod trace_cmd;

pub use analyze_cmd::*;
pub use compare_cmd::*;
pub use trace_cmd::*;
