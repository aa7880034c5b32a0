//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pagecheck: load pages in a headless browser and assert what they show
#[derive(Parser, Debug)]
#[command(name = "pagecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a suite against a headless browser
    Run(RunArgs),

    /// Load and validate a suite file without launching a browser
    Validate(ValidateArgs),

    /// Write the default suite file
    Init(InitArgs),
}

/// Arguments for the run command
#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Suite file (defaults to the built-in homepage suite)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL for cases that give a path
    #[arg(long, env = "PAGECHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// Expectation timeout in milliseconds (overrides the suite file)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Navigation timeout in milliseconds
    #[arg(long)]
    pub navigation_timeout: Option<u64>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Wall-time budget per case in milliseconds
    #[arg(long)]
    pub case_timeout: Option<u64>,

    /// Number of cases to run in parallel (0 = number of CPUs)
    #[arg(short = 'j', long, default_value = "0")]
    pub jobs: usize,

    /// Stop starting cases after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Evaluate every expectation of a case instead of stopping at the first failure
    #[arg(long)]
    pub collect_all: bool,

    /// Report format
    #[arg(long, default_value = "text")]
    pub format: ReportFormat,

    /// Directory for report files (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_viewport)]
    pub viewport: Option<(u32, u32)>,

    /// Browser user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Chromium binary
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium_path: Option<String>,

    /// Disable the Chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,
}

fn parse_viewport(raw: &str) -> Result<(u32, u32), String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid viewport dimension {s:?}"))
    };
    Ok((parse(width)?, parse(height)?))
}

/// Arguments for the validate command
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Suite file (defaults to the built-in homepage suite)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the init command
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Where to write the suite file
    #[arg(short, long, default_value = "pagecheck.yaml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Report format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Console output only
    #[default]
    Text,
    /// JSON report
    Json,
    /// JUnit XML report
    Junit,
}

impl ReportFormat {
    /// File name used when writing to an output directory
    #[must_use]
    pub const fn file_name(self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Json => Some("pagecheck-report.json"),
            Self::Junit => Some("pagecheck-junit.xml"),
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
