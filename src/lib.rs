//! Framelens core library: frame-trace reduction, aggregation and comparison.

mod analysis;
mod cmd;
mod compare;
mod config;
mod error;
mod job;
mod reduce;
mod schedule;
mod stats;
mod synth;
mod trace;
mod tracefile;

pub use analysis::*;
pub use cmd::*;
pub use compare::*;
pub use config::*;
pub use error::*;
pub use job::*;
pub use reduce::*;
pub use schedule::*;
pub use stats::*;
pub use synth::*;
pub use trace::*;
pub use tracefile::*;
