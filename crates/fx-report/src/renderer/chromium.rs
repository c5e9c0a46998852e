//! Chromium-based renderer using chromiumoxide.

use super::script::{self, ScriptOutcome};
use super::{Locator, NavigationResult, Readiness, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Environment variable pointing at a Chromium/Chrome binary.
pub const CHROMIUM_PATH_ENV: &str = "FX_REPORT_CHROMIUM_PATH";

/// Launch settings for [`ChromiumRenderer`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit browser binary. Discovered with [`find_chromium`] when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Absolute directory the browser saves downloads into.
    pub download_dir: PathBuf,
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    find_chromium_with(std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from))
}

/// Discovery order: `explicit` if it exists, then the system PATH, then the
/// standard macOS install.
pub fn find_chromium_with(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "configured Chromium does not exist");
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance whose downloads land in `options.download_dir`.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let chrome_path = match &options.executable {
            Some(path) => path.clone(),
            None => find_chromium()
                .with_context(|| format!("Chromium not found. Set {CHROMIUM_PATH_ENV}."))?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .window_size(1440, 900)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let mut downloads = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        downloads.download_path = Some(options.download_dir.display().to_string());
        browser
            .execute(downloads)
            .await
            .context("failed to set download directory")?;

        info!(
            chrome = %chrome_path.display(),
            download_dir = %options.download_dir.display(),
            "Chromium launched"
        );

        Ok(Self { browser, handler })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Box::new(ChromiumContext { page }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let Self {
            mut browser,
            handler,
        } = *self;
        let closed = browser.close().await.context("failed to close Chromium");
        let _ = browser.wait().await;
        handler.abort();
        closed.map(|_| ())
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
}

impl ChromiumContext {
    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn run_action(&self, script: &str) -> Result<()> {
        let outcome: ScriptOutcome = self.evaluate(script).await?;
        if !outcome.success {
            bail!(
                "{}",
                outcome.reason.unwrap_or_else(|| "action rejected".to_string())
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_response)) => {
                // Wait for page to be loaded
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn probe(&self, locator: &Locator, readiness: Readiness) -> Result<bool> {
        self.evaluate(&script::probe(locator, readiness)).await
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        self.run_action(&script::click(locator)).await
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
        self.run_action(&script::focus_and_clear(locator)).await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .context("failed to type text")?;
        debug!(%locator, text, "typed");
        self.run_action(&script::commit_input(locator)).await
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}
