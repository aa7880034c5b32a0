//! Page context abstraction
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageContextFactory  ──open()──►  Box<dyn PageContext>       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ChromiumFactory (feature "browser")   MockPageFactory       │
//! │  one browser context per page          scripted, in-memory   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A check only ever talks to `dyn PageContext`, so the same check runs
//! against Chromium or a scripted mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::locator::Selector;
use crate::result::{PageCheckError, PageCheckResult};

/// What a successful navigation reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    /// URL the page ended up on
    pub url: String,
    /// HTTP status of the document response, when the driver can see it
    pub status: Option<u16>,
}

impl Navigation {
    /// 2xx and 3xx count as success; a driver that cannot see the status
    /// only fails on transport errors
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |s| (200..400).contains(&s))
    }
}

/// An isolated, disposable page used to render and observe one target URL
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Navigate to `url`, giving up after `timeout`
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> PageCheckResult<Navigation>;

    /// Current document title
    async fn title(&self) -> PageCheckResult<String>;

    /// Text content of every element matching `selector`, in document order
    async fn text_contents(&self, selector: &Selector) -> PageCheckResult<Vec<String>>;

    /// Tear the context down. Must be safe to call more than once.
    async fn close(&mut self) -> PageCheckResult<()>;
}

/// Opens isolated page contexts; shared by all test cases of a run
#[async_trait]
pub trait PageContextFactory: Send + Sync {
    /// Open a fresh page context that shares no state with any other
    async fn open(&self) -> PageCheckResult<Box<dyn PageContext>>;

    /// Release factory-wide resources (e.g. the browser process)
    async fn shutdown(&self) -> PageCheckResult<()> {
        Ok(())
    }
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// Scripted content served by [`MockPage`]
///
/// Each observable is a list of frames; every read returns the next frame and
/// the last frame sticks. This models asynchronous rendering: a title of
/// `["", "Uptime"]` is empty on the first read and `"Uptime"` afterwards.
#[derive(Debug, Clone)]
pub struct MockSite {
    /// Navigation result (`Err` message simulates an unreachable endpoint)
    pub navigation: Result<Option<u16>, String>,
    /// Delay before navigation completes
    pub navigation_delay: Duration,
    /// Title frames
    pub title: Vec<String>,
    /// Element text frames per selector
    pub elements: HashMap<String, Vec<Vec<String>>>,
    /// Selectors the page rejects as invalid
    pub invalid_selectors: Vec<String>,
}

impl Default for MockSite {
    fn default() -> Self {
        Self {
            navigation: Ok(Some(200)),
            navigation_delay: Duration::ZERO,
            title: Vec::new(),
            elements: HashMap::new(),
            invalid_selectors: Vec::new(),
        }
    }
}

impl MockSite {
    /// A page that loads with status 200 and a fixed title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: vec![title.into()],
            ..Self::default()
        }
    }

    /// A page whose endpoint cannot be reached
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            navigation: Err(message.into()),
            ..Self::default()
        }
    }

    /// Set the response status
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.navigation = Ok(Some(status));
        self
    }

    /// Delay navigation
    #[must_use]
    pub const fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    /// Replace the title with a sequence of frames
    #[must_use]
    pub fn with_title_frames<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.title = frames.into_iter().map(Into::into).collect();
        self
    }

    /// Add elements matching `selector` with fixed texts
    #[must_use]
    pub fn with_elements<I, S>(mut self, selector: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frame = texts.into_iter().map(Into::into).collect();
        self.elements.insert(selector.to_string(), vec![frame]);
        self
    }

    /// Add a sequence of element-text frames for `selector`
    #[must_use]
    pub fn with_element_frames(mut self, selector: &str, frames: Vec<Vec<String>>) -> Self {
        self.elements.insert(selector.to_string(), frames);
        self
    }

    /// Make the page reject `selector`
    #[must_use]
    pub fn with_invalid_selector(mut self, selector: &str) -> Self {
        self.invalid_selectors.push(selector.to_string());
        self
    }
}

/// Mock page context for unit testing
#[derive(Debug)]
pub struct MockPage {
    site: MockSite,
    title_reads: AtomicUsize,
    element_reads: Mutex<HashMap<String, usize>>,
    navigated: bool,
    closes: Arc<AtomicUsize>,
    closed: bool,
    /// Call history for verification
    pub call_history: Arc<Mutex<Vec<String>>>,
}

impl MockPage {
    /// Create a page serving `site`
    #[must_use]
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            title_reads: AtomicUsize::new(0),
            element_reads: Mutex::new(HashMap::new()),
            navigated: false,
            closes: Arc::new(AtomicUsize::new(0)),
            closed: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, call: String) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
    }

    /// Check if a method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history
            .lock()
            .map(|h| h.iter().any(|c| c.starts_with(method)))
            .unwrap_or(false)
    }

    fn ensure_loaded(&self) -> PageCheckResult<()> {
        if self.closed {
            return Err(PageCheckError::page("page is closed"));
        }
        if !self.navigated {
            return Err(PageCheckError::page("page has not navigated"));
        }
        Ok(())
    }
}

fn frame_at<T: Clone + Default>(frames: &[T], index: usize) -> T {
    frames
        .get(index)
        .or_else(|| frames.last())
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl PageContext for MockPage {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> PageCheckResult<Navigation> {
        self.record(format!("navigate:{url}"));

        if self.site.navigation_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(PageCheckError::navigation(
                url.as_str(),
                format!("timed out after {}ms", timeout.as_millis()),
            ));
        }
        tokio::time::sleep(self.site.navigation_delay).await;

        match &self.site.navigation {
            Ok(status) => {
                self.navigated = true;
                Ok(Navigation {
                    url: url.to_string(),
                    status: *status,
                })
            }
            Err(message) => Err(PageCheckError::navigation(url.as_str(), message.clone())),
        }
    }

    async fn title(&self) -> PageCheckResult<String> {
        self.ensure_loaded()?;
        let n = self.title_reads.fetch_add(1, Ordering::SeqCst);
        self.record("title".to_string());
        Ok(frame_at(&self.site.title, n))
    }

    async fn text_contents(&self, selector: &Selector) -> PageCheckResult<Vec<String>> {
        self.ensure_loaded()?;
        self.record(format!("text_contents:{selector}"));

        if self
            .site
            .invalid_selectors
            .iter()
            .any(|s| s == selector.as_str())
        {
            return Err(PageCheckError::configuration(format!(
                "page rejected selector {:?}: SyntaxError",
                selector.as_str()
            )));
        }

        let n = {
            let mut reads = self
                .element_reads
                .lock()
                .map_err(|_| PageCheckError::page("mock state poisoned"))?;
            let count = reads.entry(selector.as_str().to_string()).or_insert(0);
            let n = *count;
            *count += 1;
            n
        };

        Ok(self
            .site
            .elements
            .get(selector.as_str())
            .map(|frames| frame_at(frames, n))
            .unwrap_or_default())
    }

    async fn close(&mut self) -> PageCheckResult<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.record("close".to_string());
        }
        Ok(())
    }
}

/// Factory handing out [`MockPage`]s that all serve the same site
#[derive(Debug, Clone)]
pub struct MockPageFactory {
    sites: Arc<Mutex<Vec<(String, MockSite)>>>,
    default_site: MockSite,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_open: bool,
}

impl MockPageFactory {
    /// Every page serves `site`
    #[must_use]
    pub fn new(site: MockSite) -> Self {
        Self {
            sites: Arc::new(Mutex::new(Vec::new())),
            default_site: site,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_open: false,
        }
    }

    /// Serve `site` instead of the default to pages navigating to URLs that
    /// start with `prefix`
    #[must_use]
    pub fn with_route(self, prefix: impl Into<String>, site: MockSite) -> Self {
        if let Ok(mut sites) = self.sites.lock() {
            sites.push((prefix.into(), site));
        }
        self
    }

    /// Make `open()` fail, as if the browser had crashed
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Number of contexts opened so far
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of contexts closed so far
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A [`MockPage`] that picks its site by URL on navigation
#[derive(Debug)]
struct RoutedMockPage {
    routes: Vec<(String, MockSite)>,
    inner: MockPage,
}

#[async_trait]
impl PageContext for RoutedMockPage {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> PageCheckResult<Navigation> {
        if let Some((_, site)) = self
            .routes
            .iter()
            .find(|(prefix, _)| url.as_str().starts_with(prefix.as_str()))
        {
            self.inner.site = site.clone();
        }
        self.inner.navigate(url, timeout).await
    }

    async fn title(&self) -> PageCheckResult<String> {
        self.inner.title().await
    }

    async fn text_contents(&self, selector: &Selector) -> PageCheckResult<Vec<String>> {
        self.inner.text_contents(selector).await
    }

    async fn close(&mut self) -> PageCheckResult<()> {
        self.inner.close().await
    }
}

#[async_trait]
impl PageContextFactory for MockPageFactory {
    async fn open(&self) -> PageCheckResult<Box<dyn PageContext>> {
        if self.fail_open {
            return Err(PageCheckError::page("browser is gone"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let routes = self
            .sites
            .lock()
            .map_err(|_| PageCheckError::page("mock state poisoned"))?
            .clone();
        let mut inner = MockPage::new(self.default_site.clone());
        inner.closes = Arc::clone(&self.closed);

        Ok(Box::new(RoutedMockPage { routes, inner }))
    }
}
