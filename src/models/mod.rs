//! Value types shared across the parser, builder and runner.

mod built;
mod config;
mod run;
mod technique;

pub use built::{BuiltDependency, BuiltTest, DependencyInfo};
pub use config::{FilterConfig, TestRunConfig};
pub use run::{CmdResult, CmdRunInfo, DependencyRunInfo, DependencyRunResults, TestRunInfo};
pub use technique::{Argument, Dependency, Executor, Technique, Test, MANUAL_EXECUTOR};
