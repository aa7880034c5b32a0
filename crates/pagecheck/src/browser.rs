//! Browser control for headless checks.
//!
//! Real browser control goes through the Chrome `DevTools` Protocol. With the
//! `browser` feature, [`ChromiumFactory`] launches one Chromium per run and
//! gives every page its own browser context, so cookies, storage and cache
//! never leak from one test case into another.

use serde::{Deserialize, Serialize};

/// Browser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            user_agent: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

// ============================================================================
// Real CDP Implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::BrowserConfig;
    use crate::driver::{Navigation, PageContext, PageContextFactory};
    use crate::locator::{Selector, TextContentsQueryResult};
    use crate::result::{PageCheckError, PageCheckResult};
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams,
    };
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use url::Url;

    /// Status of the document response, 0 when unknown
    const RESPONSE_STATUS_QUERY: &str = "(() => { const e = performance.getEntriesByType('navigation')[0]; return e && e.responseStatus ? e.responseStatus : 0; })()";

    /// Launches Chromium once and opens isolated pages on it
    #[derive(Debug)]
    pub struct ChromiumFactory {
        config: BrowserConfig,
        inner: Arc<Mutex<CdpBrowser>>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl ChromiumFactory {
        /// Launch a new browser instance
        ///
        /// # Errors
        ///
        /// Returns error if browser cannot be launched
        pub async fn launch(config: BrowserConfig) -> PageCheckResult<Self> {
            let mut builder = CdpConfig::builder()
                .window_size(config.viewport_width, config.viewport_height);

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            if let Some(ref ua) = config.user_agent {
                builder = builder.arg(format!("--user-agent={ua}"));
            }

            let cdp_config = builder
                .build()
                .map_err(|message| PageCheckError::BrowserLaunch { message })?;

            let (browser, mut handler) = CdpBrowser::launch(cdp_config).await.map_err(|e| {
                PageCheckError::BrowserLaunch {
                    message: e.to_string(),
                }
            })?;

            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        tracing::debug!(error = %e, "CDP handler stopped");
                        break;
                    }
                }
            });

            tracing::info!(headless = config.headless, "launched chromium");

            Ok(Self {
                config,
                inner: Arc::new(Mutex::new(browser)),
                handle,
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }
    }

    #[async_trait]
    impl PageContextFactory for ChromiumFactory {
        async fn open(&self) -> PageCheckResult<Box<dyn PageContext>> {
            let mut browser = self.inner.lock().await;

            let context_id = browser
                .create_browser_context(CreateBrowserContextParams::default())
                .await
                .map_err(|e| PageCheckError::page(format!("create browser context: {e}")))?;

            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(PageCheckError::page)?;

            let page = match browser.new_page(params).await {
                Ok(page) => page,
                Err(e) => {
                    let _ = browser.dispose_browser_context(context_id).await;
                    return Err(PageCheckError::page(format!("open page: {e}")));
                }
            };

            Ok(Box::new(ChromiumPage {
                browser: Arc::clone(&self.inner),
                page: Some(page),
                context_id: Some(context_id),
            }))
        }

        async fn shutdown(&self) -> PageCheckResult<()> {
            let mut browser = self.inner.lock().await;
            browser
                .close()
                .await
                .map_err(|e| PageCheckError::page(format!("close browser: {e}")))?;
            let _ = browser.wait().await;
            self.handle.abort();
            Ok(())
        }
    }

    /// One page in its own browser context
    #[derive(Debug)]
    pub struct ChromiumPage {
        browser: Arc<Mutex<CdpBrowser>>,
        page: Option<CdpPage>,
        context_id: Option<BrowserContextId>,
    }

    impl ChromiumPage {
        fn page(&self) -> PageCheckResult<&CdpPage> {
            self.page
                .as_ref()
                .ok_or_else(|| PageCheckError::page("page is closed"))
        }

        async fn evaluate<T: serde::de::DeserializeOwned>(&self, expr: &str) -> PageCheckResult<T> {
            let result = self
                .page()?
                .evaluate(expr)
                .await
                .map_err(|e| PageCheckError::page(e.to_string()))?;
            result
                .into_value()
                .map_err(|e| PageCheckError::page(e.to_string()))
        }
    }

    #[async_trait]
    impl PageContext for ChromiumPage {
        async fn navigate(&mut self, url: &Url, timeout: Duration) -> PageCheckResult<Navigation> {
            let page = self.page()?;

            match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
                Err(_) => {
                    return Err(PageCheckError::navigation(
                        url.as_str(),
                        format!("timed out after {}ms", timeout.as_millis()),
                    ))
                }
                Ok(Err(e)) => return Err(PageCheckError::navigation(url.as_str(), e.to_string())),
                Ok(Ok(_)) => {}
            }

            let landed = page
                .url()
                .await
                .map_err(|e| PageCheckError::page(e.to_string()))?
                .unwrap_or_else(|| url.to_string());

            if landed.starts_with("chrome-error://") {
                return Err(PageCheckError::navigation(
                    url.as_str(),
                    "browser showed an error page",
                ));
            }

            let status = match self.evaluate::<u16>(RESPONSE_STATUS_QUERY).await {
                Ok(0) => None,
                Ok(status) => Some(status),
                Err(err) => {
                    tracing::debug!(%url, error = %err, "response status unavailable");
                    None
                }
            };

            Ok(Navigation {
                url: landed,
                status,
            })
        }

        async fn title(&self) -> PageCheckResult<String> {
            let title = self
                .page()?
                .get_title()
                .await
                .map_err(|e| PageCheckError::page(e.to_string()))?;
            Ok(title.unwrap_or_default())
        }

        async fn text_contents(&self, selector: &Selector) -> PageCheckResult<Vec<String>> {
            let raw: TextContentsQueryResult =
                self.evaluate(&selector.to_text_contents_query()).await?;
            raw.into_texts(selector)
        }

        async fn close(&mut self) -> PageCheckResult<()> {
            if let Some(page) = self.page.take() {
                if let Err(e) = page.close().await {
                    tracing::debug!(error = %e, "page close failed");
                }
            }
            if let Some(context_id) = self.context_id.take() {
                let browser = self.browser.lock().await;
                browser
                    .dispose_browser_context(context_id)
                    .await
                    .map_err(|e| PageCheckError::page(format!("dispose browser context: {e}")))?;
            }
            Ok(())
        }
    }

    impl Drop for ChromiumPage {
        fn drop(&mut self) {
            if self.page.is_none() && self.context_id.is_none() {
                return;
            }
            let page = self.page.take();
            let context_id = self.context_id.take();
            let browser = Arc::clone(&self.browser);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Some(page) = page {
                        let _ = page.close().await;
                    }
                    if let Some(context_id) = context_id {
                        let _ = browser.lock().await.dispose_browser_context(context_id).await;
                    }
                });
            }
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::{ChromiumFactory, ChromiumPage};
