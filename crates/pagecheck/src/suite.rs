//! Test suites
//!
//! A suite is a YAML file listing test cases. Each case is one
//! [`PageAssertionCheck`]; cases run as parallel tokio tasks, each with its
//! own page context from a shared [`PageContextFactory`].
//!
//! ```yaml
//! name: uptime
//! base_url: http://localhost:3000/
//! cases:
//!   - name: homepage has title and heading text
//!     path: /
//!     expectations:
//!       - kind: title
//!         expected: Uptime
//!       - kind: locator_text
//!         selector: h1
//!         expected: Uptime
//! ```

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use url::Url;

use crate::check::{parse_target_url, CheckOptions, PageAssertionCheck};
use crate::driver::{PageContext, PageContextFactory};
use crate::expectation::Expectation;
use crate::locator::Selector;
use crate::reporter::{CaseReport, FailureMode, SuiteReport};
use crate::result::{ErrorKind, PageCheckError, PageCheckResult};
use crate::wait::{
    millis, WaitOptions, DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};

/// Base URL of the dashboard under test when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/";

// =============================================================================
// SUITE FILE
// =============================================================================

/// Defaults applied to every case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteDefaults {
    /// Expectation wait timeout
    pub timeout_ms: u64,
    /// Poll interval
    pub poll_interval_ms: u64,
    /// Navigation timeout
    pub navigation_timeout_ms: u64,
    /// Stop at the first failing expectation or evaluate all of them
    pub failure_mode: FailureMode,
}

impl Default for SuiteDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            failure_mode: FailureMode::default(),
        }
    }
}

/// One test case in a suite file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseConfig {
    /// Case name
    pub name: String,
    /// Absolute target URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Target path, joined onto the suite's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Wait timeout for this case only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Expectations, evaluated in order
    pub expectations: Vec<Expectation>,
}

/// A parsed suite file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Suite name
    pub name: String,
    /// Base URL for cases that give a `path`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Defaults for every case
    #[serde(default)]
    pub defaults: SuiteDefaults,
    /// Test cases
    pub cases: Vec<CaseConfig>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl SuiteConfig {
    /// The built-in suite: the dashboard home page has the title `Uptime`
    /// and a single `h1` reading `Uptime`
    #[must_use]
    pub fn default_homepage() -> Self {
        Self {
            name: "uptime".to_string(),
            base_url: default_base_url(),
            defaults: SuiteDefaults::default(),
            cases: vec![CaseConfig {
                name: "homepage has title and heading text".to_string(),
                url: None,
                path: Some("/".to_string()),
                timeout_ms: None,
                expectations: vec![
                    Expectation::title("Uptime"),
                    Expectation::LocatorText {
                        selector: Selector::trusted("h1"),
                        expected: "Uptime".to_string(),
                    },
                ],
            }],
        }
    }

    /// Parse a suite from YAML and validate it
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed YAML, URLs, or selectors
    pub fn from_yaml(yaml: &str) -> PageCheckResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a suite file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> PageCheckResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded suite file");
        Self::from_yaml(&yaml)
    }

    /// Serialize as YAML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> PageCheckResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Resolve a case's target URL
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL is not absolute http(s), or
    /// if the case gives both `url` and `path`
    pub fn resolve_url(&self, case: &CaseConfig) -> PageCheckResult<Url> {
        match (&case.url, &case.path) {
            (Some(_), Some(_)) => Err(PageCheckError::configuration(format!(
                "case {:?} sets both url and path",
                case.name
            ))),
            (Some(url), None) => parse_target_url(url),
            (None, path) => {
                let base = parse_target_url(&self.base_url)?;
                match path {
                    Some(path) => base.join(path).map_err(|e| {
                        PageCheckError::configuration(format!(
                            "case {:?}: cannot join path {path:?} onto {base}: {e}",
                            case.name
                        ))
                    }),
                    None => Ok(base),
                }
            }
        }
    }

    /// Check everything that can be checked without a browser
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found
    pub fn validate(&self) -> PageCheckResult<()> {
        if self.cases.is_empty() {
            return Err(PageCheckError::configuration(format!(
                "suite {:?} has no cases",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(PageCheckError::configuration("case name must not be empty"));
            }
            if !names.insert(case.name.as_str()) {
                return Err(PageCheckError::configuration(format!(
                    "duplicate case name {:?}",
                    case.name
                )));
            }
            self.resolve_url(case)?;
        }

        if self.defaults.poll_interval_ms == 0 {
            return Err(PageCheckError::configuration(
                "poll_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Build a runnable suite
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the suite is invalid
    pub fn build(&self) -> PageCheckResult<Suite> {
        self.validate()?;

        let cases = self
            .cases
            .iter()
            .map(|case| {
                let url = self.resolve_url(case)?;
                let wait = WaitOptions::new()
                    .with_timeout(case.timeout_ms.unwrap_or(self.defaults.timeout_ms))
                    .with_poll_interval(self.defaults.poll_interval_ms);
                let options = CheckOptions::default()
                    .with_navigation_timeout(Duration::from_millis(
                        self.defaults.navigation_timeout_ms,
                    ))
                    .with_wait(wait)
                    .with_failure_mode(self.defaults.failure_mode);
                Ok(TestCase {
                    name: case.name.clone(),
                    check: PageAssertionCheck::from_url(url, case.expectations.clone())
                        .with_options(options),
                })
            })
            .collect::<PageCheckResult<Vec<_>>>()?;

        Ok(Suite {
            name: self.name.clone(),
            cases,
        })
    }
}

// =============================================================================
// RUNNING
// =============================================================================

/// A named check
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Case name
    pub name: String,
    /// The check to run
    pub check: PageAssertionCheck,
}

/// Options for a suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Maximum concurrently running cases (0 = number of CPUs, capped at
    /// `Semaphore::MAX_PERMITS`)
    pub jobs: usize,
    /// Wall-time budget per case
    pub case_timeout: Option<Duration>,
    /// Stop starting cases after the first failed one
    pub fail_fast: bool,
}

impl RunOptions {
    /// Effective concurrency
    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        let jobs = if self.jobs == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.jobs
        };
        jobs.min(Semaphore::MAX_PERMITS)
    }
}

/// Signals every running case to stop
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    /// Create a handle that has not fired
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort the run
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the run was aborted
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once `rx` reports an abort; never resolves if the handle is gone
async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|fired| *fired).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A validated, runnable suite
#[derive(Debug, Clone)]
pub struct Suite {
    /// Suite name
    pub name: String,
    /// Cases in declaration order
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Run every case and collect the report.
    ///
    /// Cases run concurrently up to `options.jobs`. Every opened page context
    /// is closed, whatever the case's outcome. The report lists cases in
    /// declaration order.
    pub async fn run(
        &self,
        factory: Arc<dyn PageContextFactory>,
        options: &RunOptions,
        abort: &AbortHandle,
    ) -> SuiteReport {
        let started = Instant::now();
        let mut report = SuiteReport::new(&self.name);
        let jobs = options.effective_jobs();
        tracing::info!(suite = %self.name, cases = self.cases.len(), jobs, "running suite");

        let semaphore = Arc::new(Semaphore::new(jobs));
        let any_failed = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = self
            .cases
            .iter()
            .cloned()
            .map(|case| {
                let factory = Arc::clone(&factory);
                let semaphore = Arc::clone(&semaphore);
                let any_failed = Arc::clone(&any_failed);
                let abort_rx = abort.subscribe();
                let options = *options;
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return CaseReport::skipped(&case.name, case.check.url().as_str());
                    };
                    if options.fail_fast && any_failed.load(Ordering::SeqCst) {
                        tracing::debug!(case = %case.name, "skipped after earlier failure");
                        return CaseReport::skipped(&case.name, case.check.url().as_str());
                    }
                    let report =
                        run_case(&case, factory.as_ref(), options.case_timeout, abort_rx).await;
                    if report.status.is_failed() {
                        any_failed.store(true, Ordering::SeqCst);
                    }
                    report
                })
            })
            .collect();

        for (case, joined) in self.cases.iter().zip(join_all(handles).await) {
            let case_report = joined.unwrap_or_else(|e| {
                tracing::error!(case = %case.name, error = %e, "case task failed");
                CaseReport::interrupted(
                    &case.name,
                    case.check.url().as_str(),
                    ErrorKind::Page,
                    format!("case task failed: {e}"),
                    Duration::ZERO,
                )
            });
            report.cases.push(case_report);
        }

        report.duration_ms = millis(started.elapsed());
        tracing::info!(summary = %report.summary(), "suite finished");
        report
    }
}

enum Finished {
    Done(crate::check::CheckOutcome),
    OpenFailed(PageCheckError),
    TimedOut(Duration),
    Aborted,
}

async fn run_case(
    case: &TestCase,
    factory: &dyn PageContextFactory,
    case_timeout: Option<Duration>,
    mut abort_rx: watch::Receiver<bool>,
) -> CaseReport {
    let started = Instant::now();
    let url = case.check.url().as_str();

    if *abort_rx.borrow() {
        return CaseReport::interrupted(&case.name, url, ErrorKind::Aborted, "run aborted", Duration::ZERO);
    }

    // The budget and the abort signal cover opening the page as well as the check.
    let mut page: Option<Box<dyn PageContext>> = None;
    let finished = {
        let work = async {
            let opened = match factory.open().await {
                Ok(opened) => opened,
                Err(err) => return Finished::OpenFailed(err),
            };
            let page = page.insert(opened);
            tracing::info!(case = %case.name, %url, "case started");
            Finished::Done(case.check.run(&mut **page).await)
        };
        let bounded = async {
            match case_timeout {
                Some(budget) => tokio::time::timeout(budget, work)
                    .await
                    .unwrap_or(Finished::TimedOut(budget)),
                None => work.await,
            }
        };
        tokio::select! {
            finished = bounded => finished,
            () = aborted(&mut abort_rx) => Finished::Aborted,
        }
    };

    if let Some(mut page) = page.take() {
        if let Err(err) = page.close().await {
            tracing::warn!(case = %case.name, error = %err, "closing page context failed");
        }
    }

    let duration = started.elapsed();
    let report = match finished {
        Finished::Done(outcome) => CaseReport::from_outcome(&case.name, url, outcome, duration),
        Finished::OpenFailed(err) => {
            tracing::warn!(case = %case.name, error = %err, "could not open page context");
            CaseReport::errored(&case.name, url, &err, duration)
        }
        Finished::TimedOut(budget) => CaseReport::interrupted(
            &case.name,
            url,
            ErrorKind::CaseTimeout,
            format!("case exceeded its {}ms budget", budget.as_millis()),
            duration,
        ),
        Finished::Aborted => {
            CaseReport::interrupted(&case.name, url, ErrorKind::Aborted, "run aborted", duration)
        }
    };

    if report.status.is_passed() {
        tracing::info!(case = %case.name, duration_ms = report.duration_ms, "case passed");
    } else {
        tracing::warn!(
            case = %case.name,
            error = report.error.as_deref().unwrap_or_default(),
            "case failed"
        );
    }
    report
}
