//! Result and error types for pagecheck.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for pagecheck operations
pub type PageCheckResult<T> = Result<T, PageCheckError>;

/// Errors that can occur while checking a page
#[derive(Debug, Error)]
pub enum PageCheckError {
    /// Endpoint unreachable, navigation timed out, or non-success response
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Observable never matched the expected value before the deadline
    #[error("{description}: expected {expected:?} but last observed {observed:?} (after {elapsed_ms}ms)")]
    AssertionTimeout {
        /// What was being observed
        description: String,
        /// Last observed value
        observed: String,
        /// Expected value
        expected: String,
        /// Time spent polling
        elapsed_ms: u64,
    },

    /// Malformed target URL, selector, or suite file
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Page could not be opened, read, or closed
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PageCheckError {
    /// Create a navigation error
    #[must_use]
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// Classify the error for reporting
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Navigation { .. } => ErrorKind::Navigation,
            Self::AssertionTimeout { .. } => ErrorKind::AssertionTimeout,
            Self::Configuration { .. } | Self::Yaml(_) => ErrorKind::Configuration,
            Self::BrowserLaunch { .. } => ErrorKind::BrowserLaunch,
            Self::Page { .. } | Self::Io(_) | Self::Json(_) => ErrorKind::Page,
        }
    }
}

/// Serializable error classification used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`PageCheckError::Navigation`]
    Navigation,
    /// See [`PageCheckError::AssertionTimeout`]
    AssertionTimeout,
    /// See [`PageCheckError::Configuration`]
    Configuration,
    /// See [`PageCheckError::BrowserLaunch`]
    BrowserLaunch,
    /// See [`PageCheckError::Page`]
    Page,
    /// The whole case exceeded its time budget
    CaseTimeout,
    /// The run was aborted from outside
    Aborted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Navigation => "NavigationError",
            Self::AssertionTimeout => "AssertionTimeout",
            Self::Configuration => "ConfigurationError",
            Self::BrowserLaunch => "BrowserLaunchError",
            Self::Page => "PageError",
            Self::CaseTimeout => "CaseTimeout",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_message() {
        let err = PageCheckError::navigation("http://localhost:3000/", "connection refused");
        assert_eq!(
            err.to_string(),
            "Navigation to http://localhost:3000/ failed: connection refused"
        );
        assert_eq!(err.kind(), ErrorKind::Navigation);
    }

    #[test]
    fn test_assertion_timeout_message_has_both_values() {
        let err = PageCheckError::AssertionTimeout {
            description: "title".to_string(),
            observed: "Loading".to_string(),
            expected: "Uptime".to_string(),
            elapsed_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("\"Loading\""));
        assert!(msg.contains("\"Uptime\""));
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_yaml_errors_are_configuration() {
        let err: PageCheckError = serde_yaml_ng::from_str::<Vec<u32>>("{ nope")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Navigation.to_string(), "NavigationError");
        assert_eq!(ErrorKind::Configuration.to_string(), "ConfigurationError");
        assert_eq!(ErrorKind::AssertionTimeout.to_string(), "AssertionTimeout");
    }
}
