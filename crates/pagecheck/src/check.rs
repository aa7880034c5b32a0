//! Page assertion check
//!
//! Loads one URL in a page context and evaluates an ordered list of
//! [`Expectation`]s against it:
//!
//! ```text
//!   navigate ──► status 2xx/3xx? ──► for each expectation:
//!                    │                  poll observable until == expected
//!                    ▼                  or the wait timeout elapses
//!              NavigationError               │
//!              (no results)                  ▼
//!                                       CheckResult
//! ```

use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::driver::PageContext;
use crate::expectation::{CheckResult, Expectation, Observation};
use crate::reporter::FailureMode;
use crate::result::{PageCheckError, PageCheckResult};
use crate::wait::{millis, poll_until, WaitOptions, DEFAULT_NAVIGATION_TIMEOUT_MS};

/// Options controlling a single check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckOptions {
    /// Budget for the initial navigation
    pub navigation_timeout: Duration,
    /// Polling options for every expectation
    pub wait: WaitOptions,
    /// Stop at the first failing expectation or evaluate all of them
    pub failure_mode: FailureMode,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            wait: WaitOptions::default(),
            failure_mode: FailureMode::default(),
        }
    }
}

impl CheckOptions {
    /// Set the navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the wait options
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Set the failure mode
    #[must_use]
    pub const fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

/// Everything a check produced
#[derive(Debug)]
pub struct CheckOutcome {
    /// One result per evaluated expectation, in declaration order
    pub results: Vec<CheckResult>,
    /// First failure, if any
    pub error: Option<PageCheckError>,
}

impl CheckOutcome {
    /// True when nothing failed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.results.iter().all(|r| r.passed)
    }
}

/// Parse an absolute `http`/`https` target URL
pub fn parse_target_url(raw: &str) -> PageCheckResult<Url> {
    let url = Url::parse(raw).map_err(|e| {
        PageCheckError::configuration(format!("invalid target URL {raw:?}: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        scheme => Err(PageCheckError::configuration(format!(
            "target URL {raw:?} must be http or https with a host (got scheme {scheme:?})"
        ))),
    }
}

/// A URL plus the expectations it must satisfy
#[derive(Debug, Clone)]
pub struct PageAssertionCheck {
    url: Url,
    expectations: Vec<Expectation>,
    options: CheckOptions,
}

impl PageAssertionCheck {
    /// Create a check with default options
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `url` is not an absolute http(s) URL
    pub fn new(url: &str, expectations: Vec<Expectation>) -> PageCheckResult<Self> {
        Ok(Self::from_url(parse_target_url(url)?, expectations))
    }

    /// Create a check for an already parsed URL
    #[must_use]
    pub fn from_url(url: Url, expectations: Vec<Expectation>) -> Self {
        Self {
            url,
            expectations,
            options: CheckOptions::default(),
        }
    }

    /// Replace the options
    #[must_use]
    pub const fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    /// Target URL
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Expectations in evaluation order
    #[must_use]
    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Options in effect
    #[must_use]
    pub const fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Navigate `page` to the target and evaluate every expectation.
    ///
    /// The caller owns `page` and is responsible for closing it.
    pub async fn run(&self, page: &mut dyn PageContext) -> CheckOutcome {
        tracing::info!(url = %self.url, expectations = self.expectations.len(), "checking page");

        match page.navigate(&self.url, self.options.navigation_timeout).await {
            Ok(nav) if nav.is_success() => {
                tracing::debug!(url = %nav.url, status = ?nav.status, "navigation finished");
            }
            Ok(nav) => {
                let status = nav.status.unwrap_or_default();
                return self.navigation_failed(PageCheckError::navigation(
                    self.url.as_str(),
                    format!("server responded with status {status}"),
                ));
            }
            Err(err) => return self.navigation_failed(err),
        }

        let page: &dyn PageContext = page;
        let mut results = Vec::with_capacity(self.expectations.len());
        let mut error: Option<PageCheckError> = None;

        for expectation in &self.expectations {
            let (result, failure) = self.evaluate(page, expectation).await;
            results.push(result);

            let Some(failure) = failure else {
                continue;
            };
            tracing::warn!(url = %self.url, error = %failure, "expectation failed");

            let terminal = !matches!(failure, PageCheckError::AssertionTimeout { .. });
            error.get_or_insert(failure);
            if terminal || self.options.failure_mode == FailureMode::AndonCord {
                break;
            }
        }

        CheckOutcome { results, error }
    }

    fn navigation_failed(&self, err: PageCheckError) -> CheckOutcome {
        tracing::warn!(url = %self.url, error = %err, "navigation failed");
        CheckOutcome {
            results: Vec::new(),
            error: Some(err),
        }
    }

    async fn evaluate(
        &self,
        page: &dyn PageContext,
        expectation: &Expectation,
    ) -> (CheckResult, Option<PageCheckError>) {
        let started = Instant::now();
        let expected = expectation.expected();

        let polled = poll_until(
            &self.options.wait,
            || observe(page, expectation),
            |obs: &Observation| obs.matches(expected),
        )
        .await;

        match polled {
            Ok(poll) if poll.matched => {
                tracing::debug!(
                    what = %expectation.describe(),
                    attempts = poll.attempts,
                    "expectation passed"
                );
                let observed = poll.last.to_string();
                let result = CheckResult::passed(expectation.clone(), observed, millis(poll.elapsed));
                (result, None)
            }
            Ok(poll) => {
                let elapsed_ms = millis(poll.elapsed);
                let observed = poll.last.to_string();
                let err = PageCheckError::AssertionTimeout {
                    description: expectation.describe(),
                    observed: observed.clone(),
                    expected: expected.to_string(),
                    elapsed_ms,
                };
                let result = CheckResult::failed(expectation.clone(), observed, elapsed_ms, &err);
                (result, Some(err))
            }
            Err(err) => {
                let result = CheckResult::failed(
                    expectation.clone(),
                    String::new(),
                    millis(started.elapsed()),
                    &err,
                );
                (result, Some(err))
            }
        }
    }
}

async fn observe(page: &dyn PageContext, expectation: &Expectation) -> PageCheckResult<Observation> {
    match expectation {
        Expectation::Title { .. } => page.title().await.map(Observation::Value),
        Expectation::LocatorText { selector, .. } => {
            let texts = page.text_contents(selector).await?;
            Ok(Observation::from_texts(selector, texts))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{MockPage, MockSite};
    use crate::result::ErrorKind;

    const TARGET: &str = "http://localhost:3000/";

    fn homepage_expectations() -> Vec<Expectation> {
        vec![
            Expectation::title("Uptime"),
            Expectation::locator_text("h1", "Uptime").unwrap(),
        ]
    }

    fn uptime_site() -> MockSite {
        MockSite::new("Uptime").with_elements("h1", ["Uptime"])
    }

    fn fast_options() -> CheckOptions {
        CheckOptions::default().with_wait(WaitOptions::new().with_timeout(500).with_poll_interval(100))
    }

    async fn run_against(site: MockSite, options: CheckOptions) -> CheckOutcome {
        let check = PageAssertionCheck::new(TARGET, homepage_expectations())
            .unwrap()
            .with_options(options);
        let mut page = MockPage::new(site);
        check.run(&mut page).await
    }

    mod target_url_tests {
        use super::*;

        #[test]
        fn test_accepts_http_and_https() {
            assert!(parse_target_url("http://localhost:3000/").is_ok());
            assert!(parse_target_url("https://status.example.com/site/1").is_ok());
        }

        #[test]
        fn test_rejects_relative_and_other_schemes() {
            for raw in ["/", "localhost:3000", "file:///tmp/index.html", "ftp://host/", ""] {
                let err = parse_target_url(raw).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Configuration, "{raw}");
            }
        }

        #[test]
        fn test_new_validates_url() {
            assert!(PageAssertionCheck::new("not a url", homepage_expectations()).is_err());
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_uptime_homepage_passes() {
            let outcome = run_against(uptime_site(), fast_options()).await;
            assert!(outcome.passed());
            assert_eq!(outcome.results.len(), 2);
            assert!(outcome.results.iter().all(|r| r.passed));
            assert_eq!(outcome.results[0].observed, "Uptime");
            assert_eq!(outcome.results[1].observed, "Uptime");
        }

        #[tokio::test(start_paused = true)]
        async fn test_unreachable_is_navigation_error_without_results() {
            let outcome =
                run_against(MockSite::unreachable("connection refused"), fast_options()).await;
            assert!(!outcome.passed());
            assert!(outcome.results.is_empty());
            assert_eq!(
                outcome.error.as_ref().map(PageCheckError::kind),
                Some(ErrorKind::Navigation)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_error_status_is_navigation_error() {
            let outcome = run_against(uptime_site().with_status(404), fast_options()).await;
            assert!(outcome.results.is_empty());
            let err = outcome.error.unwrap();
            assert_eq!(err.kind(), ErrorKind::Navigation);
            assert!(err.to_string().contains("404"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_redirect_status_is_success() {
            let outcome = run_against(uptime_site().with_status(304), fast_options()).await;
            assert!(outcome.passed());
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_timeout() {
            let site = uptime_site().with_navigation_delay(Duration::from_secs(120));
            let options = fast_options().with_navigation_timeout(Duration::from_secs(1));
            let outcome = run_against(site, options).await;
            assert!(outcome.results.is_empty());
            assert_eq!(
                outcome.error.as_ref().map(PageCheckError::kind),
                Some(ErrorKind::Navigation)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_changed_title_reports_observed_value() {
            let site = MockSite::new("Uptime Kuma").with_elements("h1", ["Uptime"]);
            let outcome = run_against(site, fast_options()).await;
            assert!(!outcome.passed());
            assert_eq!(outcome.results.len(), 1);
            let result = &outcome.results[0];
            assert!(!result.passed);
            assert_eq!(result.observed, "Uptime Kuma");
            assert_eq!(result.expected, "Uptime");
            assert_eq!(result.elapsed_ms, 500);
            assert_eq!(
                outcome.error.as_ref().map(PageCheckError::kind),
                Some(ErrorKind::AssertionTimeout)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_changed_heading_fails() {
            let site = MockSite::new("Uptime").with_elements("h1", ["Status"]);
            let outcome = run_against(site, fast_options()).await;
            assert!(!outcome.passed());
            assert!(outcome.results[0].passed);
            assert!(!outcome.results[1].passed);
            assert_eq!(outcome.results[1].observed, "Status");
        }

        #[tokio::test(start_paused = true)]
        async fn test_two_headings_fail_strict_locator() {
            let site = MockSite::new("Uptime").with_elements("h1", ["Uptime", "Uptime"]);
            let outcome = run_against(site, fast_options()).await;
            assert!(!outcome.passed());
            assert_eq!(outcome.results[1].observed, r#"<2 elements match "h1">"#);
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_heading_fails() {
            let outcome = run_against(MockSite::new("Uptime"), fast_options()).await;
            assert!(!outcome.passed());
            assert_eq!(outcome.results[1].observed, r#"<no element matches "h1">"#);
        }

        #[tokio::test(start_paused = true)]
        async fn test_async_rendering_passes_within_timeout() {
            let site = MockSite::new("")
                .with_title_frames(["", "Loading", "Uptime"])
                .with_element_frames(
                    "h1",
                    vec![vec![], vec![], vec!["Uptime".to_string()]],
                );
            let outcome = run_against(site, fast_options()).await;
            assert!(outcome.passed());
            assert_eq!(outcome.results[0].elapsed_ms, 200);
        }

        #[tokio::test(start_paused = true)]
        async fn test_idempotent_outcomes() {
            let first = run_against(uptime_site(), fast_options()).await;
            let second = run_against(uptime_site(), fast_options()).await;
            let a: Vec<_> = first.results.iter().map(CheckResult::outcome).collect();
            let b: Vec<_> = second.results.iter().map(CheckResult::outcome).collect();
            assert_eq!(a, b);
        }

        #[tokio::test(start_paused = true)]
        async fn test_page_rejected_selector_is_configuration_error() {
            let site = uptime_site().with_invalid_selector("h1");
            let outcome = run_against(site, fast_options()).await;
            assert_eq!(outcome.results.len(), 2);
            assert_eq!(
                outcome.error.as_ref().map(PageCheckError::kind),
                Some(ErrorKind::Configuration)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_andon_cord_stops_at_first_failure() {
            let site = MockSite::new("Other").with_elements("h1", ["Other"]);
            let outcome = run_against(site, fast_options()).await;
            assert_eq!(outcome.results.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_collect_all_evaluates_everything() {
            let site = MockSite::new("Other").with_elements("h1", ["Other"]);
            let options = fast_options().with_failure_mode(FailureMode::CollectAll);
            let outcome = run_against(site, options).await;
            assert_eq!(outcome.results.len(), 2);
            assert!(outcome.results.iter().all(|r| !r.passed));
            // first failure wins
            let err = outcome.error.unwrap();
            assert!(err.to_string().starts_with("title"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_collect_all_still_stops_on_page_error() {
            let site = MockSite::new("Other").with_invalid_selector("h1");
            let check = PageAssertionCheck::new(
                TARGET,
                vec![
                    Expectation::locator_text("h1", "Uptime").unwrap(),
                    Expectation::title("Uptime"),
                ],
            )
            .unwrap()
            .with_options(fast_options().with_failure_mode(FailureMode::CollectAll));
            let mut page = MockPage::new(site);
            let outcome = check.run(&mut page).await;
            assert_eq!(outcome.results.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_expectations_read_in_declaration_order() {
            let check = PageAssertionCheck::new(TARGET, homepage_expectations()).unwrap();
            let mut page = MockPage::new(uptime_site());
            let history = std::sync::Arc::clone(&page.call_history);
            check.run(&mut page).await;
            let calls = history.lock().unwrap().clone();
            assert_eq!(
                calls,
                vec![
                    "navigate:http://localhost:3000/".to_string(),
                    "title".to_string(),
                    "text_contents:h1".to_string(),
                ]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_empty_expectations_pass() {
            let check = PageAssertionCheck::new(TARGET, Vec::new()).unwrap();
            let mut page = MockPage::new(uptime_site());
            assert!(check.run(&mut page).await.passed());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_strict_substring_never_matches(
                s in "[A-Za-z ]{2,20}",
                cut in 1usize..20
            ) {
                let cut = cut.min(s.len() - 1);
                let obs = Observation::Value(s[..cut].to_string());
                prop_assert!(!obs.matches(&s));
            }

            #[test]
            fn prop_case_change_never_matches(s in "[a-z]{1,20}") {
                let obs = Observation::Value(s.to_uppercase());
                prop_assert!(!obs.matches(&s));
            }

            #[test]
            fn prop_identical_text_matches(s in ".*") {
                let obs = Observation::Value(s.clone());
                prop_assert!(obs.matches(&s));
            }
        }
    }
}
