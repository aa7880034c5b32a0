//! Pagecheck: browser-driven page assertion checks
//!
//! Load a web page in an isolated page context, assert observable
//! properties (document title, text of a located element) with bounded
//! polling, and report pass/fail.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    PAGECHECK Architecture                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Suite      │    │ PageAssert │    │ PageContext│            │
//! │   │ (YAML)     │───►│ ionCheck   │───►│ (chromium  │            │
//! │   │            │    │ poll/equal │    │  or mock)  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │         │                                                       │
//! │         ▼                                                       │
//! │   ┌────────────┐                                                │
//! │   │ SuiteReport│──► JSON / JUnit                                │
//! │   └────────────┘                                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pagecheck::{Expectation, MockPage, MockSite, PageAssertionCheck};
//!
//! # async fn demo() -> pagecheck::PageCheckResult<()> {
//! let check = PageAssertionCheck::new(
//!     "http://localhost:3000/",
//!     vec![
//!         Expectation::title("Uptime"),
//!         Expectation::locator_text("h1", "Uptime")?,
//!     ],
//! )?;
//! let mut page = MockPage::new(MockSite::new("Uptime").with_elements("h1", ["Uptime"]));
//! assert!(check.run(&mut page).await.passed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod browser;
mod check;
mod driver;
mod expectation;
mod locator;
mod reporter;
mod result;
mod suite;
mod wait;

#[cfg(feature = "browser")]
pub use browser::{ChromiumFactory, ChromiumPage};
pub use browser::BrowserConfig;
pub use check::{parse_target_url, CheckOptions, CheckOutcome, PageAssertionCheck};
pub use driver::{MockPage, MockPageFactory, MockSite, Navigation, PageContext, PageContextFactory};
pub use expectation::{CheckFailure, CheckResult, Expectation, Observation};
pub use locator::{Selector, TextContentsQueryResult};
pub use reporter::{CaseReport, CaseStatus, FailureMode, SuiteReport};
pub use result::{ErrorKind, PageCheckError, PageCheckResult};
pub use suite::{
    AbortHandle, CaseConfig, RunOptions, Suite, SuiteConfig, SuiteDefaults, TestCase,
    DEFAULT_BASE_URL,
};
pub use wait::{
    poll_until, PollOutcome, WaitOptions, DEFAULT_MAX_POLL_INTERVAL_MS,
    DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};
