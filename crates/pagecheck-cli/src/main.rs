//! Pagecheck CLI: run browser page assertion suites
//!
//! ## Usage
//!
//! ```bash
//! pagecheck run                                # built-in homepage suite
//! pagecheck run --config suite.yaml -j 4       # run a suite file
//! pagecheck run --format junit --output target # write JUnit XML
//! pagecheck validate --config suite.yaml       # check without a browser
//! pagecheck init                               # write pagecheck.yaml
//! ```

use clap::Parser;
use pagecheck::AbortHandle;
use pagecheck_cli::{
    describe_suite, init_suite, load_suite, Cli, CliConfig, CliError, CliResult, ColorChoice,
    Commands, InitArgs, RunArgs, SuiteRunner, ValidateArgs, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Run(args) => run_suite(&config, &args),
        Commands::Validate(args) => run_validate(&args),
        Commands::Init(args) => run_init(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

fn init_tracing(verbosity: Verbosity) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_suite(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let mut runner = SuiteRunner::new(config);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::execution(format!("Failed to create runtime: {e}")))?;

    let report = rt.block_on(async {
        let abort = AbortHandle::new();
        let on_signal = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("interrupted, aborting run (press Ctrl-C again to exit now)");
            on_signal.abort();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
        runner.run(args, &abort).await
    })?;

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::ChecksFailed {
            failed: report.total_count() - report.passed_count(),
            total: report.total_count(),
        })
    }
}

fn run_validate(args: &ValidateArgs) -> CliResult<()> {
    let suite = load_suite(args.config.as_deref())?;
    for line in describe_suite(&suite)? {
        println!("{line}");
    }
    println!("ok");
    Ok(())
}

fn run_init(config: &CliConfig, args: &InitArgs) -> CliResult<()> {
    let path = init_suite(args)?;
    if !config.verbosity.is_quiet() {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
