//! Headless-browser pool for JS-rendered pages.
//!
//! One shared browser process, semaphore-bounded page contexts, and request
//! blocking for heavy resource types. Only compiled with the `browser`
//! cargo feature so pure-HTTP builds carry none of the CDP stack.
//!
//! The pool starts lazily on first use and is explicitly closed on
//! shutdown via [`BrowserPool::close`].

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};

use crate::error::ScrapeError;

const DEFAULT_MAX_CONTEXTS: usize = 8;
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const SCROLL_MAX_ATTEMPTS: u32 = 10;

/// URL patterns blocked inside every page: images, fonts, media, and
/// stylesheets only slow the render down.
const BLOCKED_PATTERNS: [&str; 12] = [
    "*.png", "*.jpg", "*.jpeg", "*.webp", "*.gif", "*.svg", "*.css", "*.woff", "*.woff2",
    "*.ttf", "*.mp4", "*.webm",
];

struct BrowserHandle {
    browser: Browser,
    event_loop: tokio::task::JoinHandle<()>,
}

pub struct BrowserPool {
    contexts: Semaphore,
    inner: Mutex<Option<BrowserHandle>>,
}

static POOL: std::sync::OnceLock<BrowserPool> = std::sync::OnceLock::new();

/// The process-wide pool, created on first access and started on first use.
pub fn shared_pool() -> &'static BrowserPool {
    POOL.get_or_init(|| BrowserPool::new(DEFAULT_MAX_CONTEXTS))
}

impl BrowserPool {
    #[must_use]
    pub fn new(max_contexts: usize) -> Self {
        Self {
            contexts: Semaphore::new(max_contexts.max(1)),
            inner: Mutex::new(None),
        }
    }

    /// Render `url` and return the resulting HTML. Each call gets its own
    /// page, bounded by the context semaphore; `scroll_to_bottom` drives
    /// infinite-scroll layouts until the scroll height stabilizes.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Browser`] for launch, navigation, or
    /// evaluation failures.
    pub async fn fetch_page(&self, url: &str, scroll_to_bottom: bool) -> Result<String, ScrapeError> {
        let _permit = self
            .contexts
            .acquire()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        self.ensure_started().await?;

        let page = {
            let guard = self.inner.lock().await;
            let handle = guard
                .as_ref()
                .ok_or_else(|| ScrapeError::Browser("browser not running".to_string()))?;
            handle
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?
        };

        let result = Self::render(&page, url, scroll_to_bottom).await;
        // Best effort; a failed close only leaks one tab until shutdown.
        let _ = page.close().await;
        result
    }

    async fn render(page: &Page, url: &str, scroll_to_bottom: bool) -> Result<String, ScrapeError> {
        page.execute(SetBlockedUrLsParams::new(
            BLOCKED_PATTERNS.iter().map(ToString::to_string).collect::<Vec<_>>(),
        ))
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        tokio::time::timeout(PAGE_TIMEOUT, async {
            page.goto(url)
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            Ok::<_, ScrapeError>(())
        })
        .await
        .map_err(|_| ScrapeError::Browser(format!("navigation timed out for {url}")))??;

        if scroll_to_bottom {
            Self::scroll_until_stable(page).await?;
        }

        page.content()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }

    /// Scroll down until `scrollHeight` stops growing (or the attempt cap
    /// is hit) so lazily-loaded lists are fully materialized.
    async fn scroll_until_stable(page: &Page) -> Result<(), ScrapeError> {
        let mut previous_height: i64 = -1;
        for _ in 0..SCROLL_MAX_ATTEMPTS {
            let height: i64 = page
                .evaluate("document.body.scrollHeight")
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?
                .into_value()
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            if height == previous_height {
                break;
            }
            previous_height = height;

            page.evaluate("window.scrollBy(0, 5000)")
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(())
    }

    async fn ensure_started(&self) -> Result<(), ScrapeError> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        tracing::info!("starting headless browser");
        let config = BrowserConfig::builder()
            .args(vec![
                "--disable-dev-shm-usage",
                "--no-sandbox",
                "--disable-gpu",
                "--disable-notifications",
                "--disable-background-timer-throttling",
            ])
            .build()
            .map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        *guard = Some(BrowserHandle {
            browser,
            event_loop,
        });
        Ok(())
    }

    /// Shut the browser down. Safe to call when it never started.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut handle) = guard.take() {
            if let Err(e) = handle.browser.close().await {
                tracing::warn!(error = %e, "browser close failed");
            }
            handle.event_loop.abort();
            tracing::info!("headless browser closed");
        }
    }
}
