//! Pagecheck CLI Library
//!
//! Command-line interface for running pagecheck suites.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, InitArgs, ReportFormat, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{describe_result, ProgressReporter};
pub use runner::{
    apply_overrides, browser_config, describe_suite, init_suite, load_suite, render_report,
    run_options, SuiteRunner,
};
