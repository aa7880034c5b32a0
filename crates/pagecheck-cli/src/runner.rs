//! Suite runner: turns CLI arguments into a suite run

use crate::commands::{InitArgs, ReportFormat, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use pagecheck::{
    AbortHandle, BrowserConfig, FailureMode, PageCheckError, PageContextFactory, RunOptions, Suite,
    SuiteConfig, SuiteReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Load the suite file, or the built-in homepage suite when `path` is None
pub fn load_suite(path: Option<&Path>) -> CliResult<SuiteConfig> {
    let Some(path) = path else {
        return Ok(SuiteConfig::default_homepage());
    };
    SuiteConfig::load(path).map_err(|err| match err {
        PageCheckError::Io(io) => {
            CliError::config(format!("cannot read suite file {}: {io}", path.display()))
        }
        other => CliError::config(format!("{}: {other}", path.display())),
    })
}

/// Apply command-line overrides on top of the suite file
pub fn apply_overrides(suite: &mut SuiteConfig, args: &RunArgs) -> CliResult<()> {
    if let Some(base_url) = &args.base_url {
        suite.base_url.clone_from(base_url);
    }
    if let Some(timeout) = args.timeout {
        suite.defaults.timeout_ms = timeout;
        for case in &mut suite.cases {
            case.timeout_ms = None;
        }
    }
    if let Some(timeout) = args.navigation_timeout {
        suite.defaults.navigation_timeout_ms = timeout;
    }
    if let Some(interval) = args.poll_interval {
        if interval == 0 {
            return Err(CliError::invalid_argument(
                "--poll-interval must be greater than zero",
            ));
        }
        suite.defaults.poll_interval_ms = interval;
    }
    if args.collect_all {
        suite.defaults.failure_mode = FailureMode::CollectAll;
    }
    Ok(())
}

/// Run options from command-line arguments
#[must_use]
pub fn run_options(args: &RunArgs) -> RunOptions {
    RunOptions {
        jobs: args.jobs,
        case_timeout: args.case_timeout.map(Duration::from_millis),
        fail_fast: args.fail_fast,
    }
}

/// Browser configuration from command-line arguments
#[must_use]
pub fn browser_config(args: &RunArgs) -> BrowserConfig {
    let mut config = BrowserConfig::default().with_headless(!args.headed);
    if let Some((width, height)) = args.viewport {
        config = config.with_viewport(width, height);
    }
    if let Some(user_agent) = &args.user_agent {
        config = config.with_user_agent(user_agent);
    }
    if let Some(path) = &args.chromium_path {
        config = config.with_chromium_path(path);
    }
    if args.no_sandbox {
        config = config.with_no_sandbox();
    }
    config
}

/// One line per case: name, resolved URL, expectation count
pub fn describe_suite(suite: &SuiteConfig) -> CliResult<Vec<String>> {
    let mut lines = vec![format!("suite {}: {} case(s)", suite.name, suite.cases.len())];
    for case in &suite.cases {
        let url = suite.resolve_url(case)?;
        lines.push(format!(
            "  {} -> {} ({} expectation(s))",
            case.name,
            url,
            case.expectations.len()
        ));
        for expectation in &case.expectations {
            lines.push(format!(
                "      {} == {:?}",
                expectation.describe(),
                expectation.expected()
            ));
        }
    }
    Ok(lines)
}

/// Render a machine-readable report; `None` for text
pub fn render_report(report: &SuiteReport, format: ReportFormat) -> CliResult<Option<String>> {
    match format {
        ReportFormat::Text => Ok(None),
        ReportFormat::Json => report
            .to_json()
            .map(Some)
            .map_err(|e| CliError::report_generation(e.to_string())),
        ReportFormat::Junit => Ok(Some(report.render_junit())),
    }
}

/// Write the default suite file
pub fn init_suite(args: &InitArgs) -> CliResult<PathBuf> {
    if args.output.exists() && !args.force {
        return Err(CliError::config(format!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        )));
    }
    let yaml = SuiteConfig::default_homepage().to_yaml()?;
    std::fs::write(&args.output, yaml)?;
    Ok(args.output.clone())
}

/// Runs suites and reports on the console
#[derive(Debug)]
pub struct SuiteRunner {
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a new runner
    #[must_use]
    pub fn new(config: &CliConfig) -> Self {
        let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
            .with_verbose(config.verbosity.is_verbose());
        Self { reporter }
    }

    /// Load, override, launch, run, report
    pub async fn run(&mut self, args: &RunArgs, abort: &AbortHandle) -> CliResult<SuiteReport> {
        let mut config = load_suite(args.config.as_deref())?;
        apply_overrides(&mut config, args)?;
        let suite = config.build()?;

        let factory = launch_factory(args).await?;
        let report = self
            .execute(&suite, Arc::clone(&factory), &run_options(args), abort)
            .await;
        if let Err(err) = factory.shutdown().await {
            tracing::warn!(error = %err, "browser shutdown failed");
        }

        self.write_report(&report, args.format, args.output.as_deref())?;
        Ok(report)
    }

    /// Run a built suite on `factory` with console progress
    pub async fn execute(
        &mut self,
        suite: &Suite,
        factory: Arc<dyn PageContextFactory>,
        options: &RunOptions,
        abort: &AbortHandle,
    ) -> SuiteReport {
        self.reporter.header(&format!("Suite {}", suite.name));
        self.reporter.start_progress(
            suite.cases.len() as u64,
            &format!("running {} case(s)", suite.cases.len()),
        );

        let report = suite.run(factory, options, abort).await;

        self.reporter.finish();
        for case in &report.cases {
            self.reporter.case(case);
        }
        if abort.is_aborted() {
            self.reporter.warning("run was aborted");
        }
        self.reporter.summary(
            report.passed_count(),
            report.failed_count(),
            report.skipped_count(),
            Duration::from_millis(report.duration_ms),
        );
        report
    }

    /// Write the report to `output` (a directory) or print it to stdout
    pub fn write_report(
        &self,
        report: &SuiteReport,
        format: ReportFormat,
        output: Option<&Path>,
    ) -> CliResult<Option<PathBuf>> {
        let (Some(dir), Some(file_name)) = (output, format.file_name()) else {
            if let Some(rendered) = render_report(report, format)? {
                println!("{rendered}");
            }
            return Ok(None);
        };

        std::fs::create_dir_all(dir)
            .map_err(|e| CliError::report_generation(format!("{}: {e}", dir.display())))?;
        let path = dir.join(file_name);
        let written = match format {
            ReportFormat::Json => report.write_json(&path),
            ReportFormat::Junit => report.write_junit(&path),
            ReportFormat::Text => Ok(()),
        };
        written.map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))?;
        self.reporter
            .info(&format!("report written to {}", path.display()));
        Ok(Some(path))
    }
}

#[cfg(feature = "browser")]
async fn launch_factory(args: &RunArgs) -> CliResult<Arc<dyn PageContextFactory>> {
    let factory = pagecheck::ChromiumFactory::launch(browser_config(args))
        .await
        .map_err(|e| CliError::execution(e.to_string()))?;
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "browser"))]
async fn launch_factory(_args: &RunArgs) -> CliResult<Arc<dyn PageContextFactory>> {
    Err(CliError::config(
        "pagecheck was built without the `browser` feature",
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};
    use pagecheck::{CaseStatus, MockPageFactory, MockSite};

    fn quiet_runner() -> SuiteRunner {
        SuiteRunner::new(
            &CliConfig::new()
                .with_verbosity(Verbosity::Quiet)
                .with_color(ColorChoice::Never),
        )
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_default_suite_without_path() {
            let suite = load_suite(None).unwrap();
            assert_eq!(suite, SuiteConfig::default_homepage());
        }

        #[test]
        fn test_missing_file_is_config_error() {
            let err = load_suite(Some(Path::new("/nonexistent/suite.yaml"))).unwrap_err();
            assert_eq!(err.exit_code(), 2);
            assert!(err.to_string().contains("cannot read suite file"));
        }

        #[test]
        fn test_invalid_file_is_config_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("suite.yaml");
            std::fs::write(&path, "name: x\ncases: []\n").unwrap();
            let err = load_suite(Some(&path)).unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_overrides() {
            let mut suite = SuiteConfig::default_homepage();
            suite.cases[0].timeout_ms = Some(100);
            let args = RunArgs {
                base_url: Some("http://127.0.0.1:8080/".to_string()),
                timeout: Some(2_000),
                navigation_timeout: Some(9_000),
                poll_interval: Some(50),
                collect_all: true,
                ..RunArgs::default()
            };
            apply_overrides(&mut suite, &args).unwrap();
            assert_eq!(suite.base_url, "http://127.0.0.1:8080/");
            assert_eq!(suite.defaults.timeout_ms, 2_000);
            assert_eq!(suite.cases[0].timeout_ms, None);
            assert_eq!(suite.defaults.navigation_timeout_ms, 9_000);
            assert_eq!(suite.defaults.poll_interval_ms, 50);
            assert_eq!(suite.defaults.failure_mode, FailureMode::CollectAll);
        }

        #[test]
        fn test_no_overrides_keeps_suite() {
            let mut suite = SuiteConfig::default_homepage();
            apply_overrides(&mut suite, &RunArgs::default()).unwrap();
            assert_eq!(suite, SuiteConfig::default_homepage());
        }

        #[test]
        fn test_zero_poll_interval_rejected() {
            let mut suite = SuiteConfig::default_homepage();
            let args = RunArgs {
                poll_interval: Some(0),
                ..RunArgs::default()
            };
            assert_eq!(apply_overrides(&mut suite, &args).unwrap_err().exit_code(), 2);
        }

        #[test]
        fn test_bad_base_url_fails_build() {
            let mut suite = SuiteConfig::default_homepage();
            let args = RunArgs {
                base_url: Some("not a url".to_string()),
                ..RunArgs::default()
            };
            apply_overrides(&mut suite, &args).unwrap();
            let err: CliError = suite.build().unwrap_err().into();
            assert_eq!(err.exit_code(), 2);
        }

        #[test]
        fn test_run_options_and_browser_config() {
            let args = RunArgs {
                jobs: 3,
                case_timeout: Some(1_500),
                fail_fast: true,
                headed: true,
                no_sandbox: true,
                chromium_path: Some("/opt/chromium".to_string()),
                viewport: Some((390, 844)),
                user_agent: Some("pagecheck-test".to_string()),
                ..RunArgs::default()
            };
            let options = run_options(&args);
            assert_eq!(options.jobs, 3);
            assert_eq!(options.case_timeout, Some(Duration::from_millis(1_500)));
            assert!(options.fail_fast);

            let browser = browser_config(&args);
            assert!(!browser.headless);
            assert!(!browser.sandbox);
            assert_eq!(browser.chromium_path.as_deref(), Some("/opt/chromium"));
            assert_eq!((browser.viewport_width, browser.viewport_height), (390, 844));
            assert_eq!(browser.user_agent.as_deref(), Some("pagecheck-test"));
        }
    }

    mod describe_tests {
        use super::*;

        #[test]
        fn test_describe_default_suite() {
            let lines = describe_suite(&SuiteConfig::default_homepage()).unwrap();
            assert_eq!(lines[0], "suite uptime: 1 case(s)");
            assert!(lines[1].contains("homepage has title and heading text"));
            assert!(lines[1].contains("http://localhost:3000/"));
            assert!(lines.iter().any(|l| l.contains(r#"text of "h1" == "Uptime""#)));
        }
    }

    mod init_tests {
        use super::*;

        #[test]
        fn test_init_writes_default_suite() {
            let dir = tempfile::tempdir().unwrap();
            let args = InitArgs {
                output: dir.path().join("pagecheck.yaml"),
                force: false,
            };
            let path = init_suite(&args).unwrap();
            let loaded = load_suite(Some(&path)).unwrap();
            assert_eq!(loaded, SuiteConfig::default_homepage());
        }

        #[test]
        fn test_init_refuses_overwrite() {
            let dir = tempfile::tempdir().unwrap();
            let output = dir.path().join("pagecheck.yaml");
            std::fs::write(&output, "keep me").unwrap();
            let err = init_suite(&InitArgs {
                output: output.clone(),
                force: false,
            })
            .unwrap_err();
            assert_eq!(err.exit_code(), 2);
            assert_eq!(std::fs::read_to_string(&output).unwrap(), "keep me");

            init_suite(&InitArgs {
                output: output.clone(),
                force: true,
            })
            .unwrap();
            assert!(std::fs::read_to_string(&output)
                .unwrap()
                .contains("Uptime"));
        }
    }

    mod execute_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_execute_against_mock() {
            let mut runner = quiet_runner();
            let suite = SuiteConfig::default_homepage().build().unwrap();
            let factory =
                MockPageFactory::new(MockSite::new("Uptime").with_elements("h1", ["Uptime"]));
            let report = runner
                .execute(
                    &suite,
                    Arc::new(factory.clone()),
                    &RunOptions::default(),
                    &AbortHandle::new(),
                )
                .await;
            assert!(report.all_passed());
            assert_eq!(factory.closed(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_execute_reports_failure() {
            let mut runner = quiet_runner();
            let suite = SuiteConfig::default_homepage().build().unwrap();
            let factory = MockPageFactory::new(MockSite::unreachable("connection refused"));
            let report = runner
                .execute(
                    &suite,
                    Arc::new(factory),
                    &RunOptions::default(),
                    &AbortHandle::new(),
                )
                .await;
            assert_eq!(report.cases[0].status, CaseStatus::Failed);
            assert!(!report.all_passed());
        }
    }

    mod report_tests {
        use super::*;

        #[test]
        fn test_render_text_is_none() {
            let report = SuiteReport::new("uptime");
            assert!(render_report(&report, ReportFormat::Text).unwrap().is_none());
        }

        #[test]
        fn test_write_json_and_junit() {
            let dir = tempfile::tempdir().unwrap();
            let runner = quiet_runner();
            let report = SuiteReport::new("uptime");

            let json = runner
                .write_report(&report, ReportFormat::Json, Some(dir.path()))
                .unwrap()
                .unwrap();
            assert!(json.ends_with("pagecheck-report.json"));
            assert!(std::fs::read_to_string(&json).unwrap().contains("\"suite\": \"uptime\""));

            let junit = runner
                .write_report(&report, ReportFormat::Junit, Some(&dir.path().join("nested")))
                .unwrap()
                .unwrap();
            assert!(std::fs::read_to_string(&junit).unwrap().contains("<testsuite"));
        }
    }
}
