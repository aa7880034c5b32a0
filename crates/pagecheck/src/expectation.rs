//! Expectations and their evaluated results.

use serde::{Deserialize, Serialize};

use crate::locator::Selector;
use crate::result::{ErrorKind, PageCheckError, PageCheckResult};

/// A single declarative assertion about an observable page property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// The document title equals `expected`
    Title {
        /// Expected title
        expected: String,
    },
    /// Exactly one element matches `selector` and its text content equals
    /// `expected`
    LocatorText {
        /// Element selector
        selector: Selector,
        /// Expected text content
        expected: String,
    },
}

impl Expectation {
    /// Expect the document title
    #[must_use]
    pub fn title(expected: impl Into<String>) -> Self {
        Self::Title {
            expected: expected.into(),
        }
    }

    /// Expect the text of the single element matching `selector`
    pub fn locator_text(
        selector: impl Into<String>,
        expected: impl Into<String>,
    ) -> PageCheckResult<Self> {
        Ok(Self::LocatorText {
            selector: Selector::parse(selector)?,
            expected: expected.into(),
        })
    }

    /// Expected value
    #[must_use]
    pub fn expected(&self) -> &str {
        match self {
            Self::Title { expected } | Self::LocatorText { expected, .. } => expected,
        }
    }

    /// Short human-readable description, e.g. `title` or `text of "h1"`
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Title { .. } => "title".to_string(),
            Self::LocatorText { selector, .. } => format!("text of {:?}", selector.as_str()),
        }
    }
}

/// One read of an observable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A single value was read (title, or the text of the one matching element)
    Value(String),
    /// No element matched the selector
    NoMatch {
        /// The selector
        selector: Selector,
    },
    /// More than one element matched the selector
    Ambiguous {
        /// The selector
        selector: Selector,
        /// Number of matches
        count: usize,
    },
}

impl Observation {
    /// Build a strict locator observation from element text contents
    #[must_use]
    pub fn from_texts(selector: &Selector, mut texts: Vec<String>) -> Self {
        match texts.len() {
            0 => Self::NoMatch {
                selector: selector.clone(),
            },
            1 => Self::Value(texts.remove(0)),
            count => Self::Ambiguous {
                selector: selector.clone(),
                count,
            },
        }
    }

    /// Exact, case-sensitive comparison; only a single value can match
    #[must_use]
    pub fn matches(&self, expected: &str) -> bool {
        matches!(self, Self::Value(v) if v == expected)
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.write_str(v),
            Self::NoMatch { selector } => {
                write!(f, "<no element matches {:?}>", selector.as_str())
            }
            Self::Ambiguous { selector, count } => {
                write!(f, "<{count} elements match {:?}>", selector.as_str())
            }
        }
    }
}

/// Why an expectation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl From<&PageCheckError> for CheckFailure {
    fn from(err: &PageCheckError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of evaluating one [`Expectation`]. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// The evaluated expectation
    pub expectation: Expectation,
    /// Whether the observable matched
    pub passed: bool,
    /// Last observed value
    pub observed: String,
    /// Expected value
    pub expected: String,
    /// Time spent evaluating
    pub elapsed_ms: u64,
    /// Failure details when not passed
    pub failure: Option<CheckFailure>,
}

impl CheckResult {
    /// Create a passing result
    #[must_use]
    pub fn passed(expectation: Expectation, observed: impl Into<String>, elapsed_ms: u64) -> Self {
        let expected = expectation.expected().to_string();
        Self {
            expectation,
            passed: true,
            observed: observed.into(),
            expected,
            elapsed_ms,
            failure: None,
        }
    }

    /// Create a failing result
    #[must_use]
    pub fn failed(
        expectation: Expectation,
        observed: impl Into<String>,
        elapsed_ms: u64,
        error: &PageCheckError,
    ) -> Self {
        let expected = expectation.expected().to_string();
        Self {
            expectation,
            passed: false,
            observed: observed.into(),
            expected,
            elapsed_ms,
            failure: Some(error.into()),
        }
    }

    /// Everything but timing; two runs against an unchanged page produce
    /// equal outcomes
    #[must_use]
    pub fn outcome(&self) -> (&Expectation, bool, &str, &str) {
        (&self.expectation, self.passed, &self.observed, &self.expected)
    }
}
