//! Browser session lifecycle.
//!
//! A session is launched for every check and torn down afterwards, so no
//! browser state leaks from one tick into the next.

mod chromium;

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::page::Page;

pub use chromium::ChromiumPage;

/// Starts browser sessions. Implemented for Chromium in production and by
/// fixtures in tests.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: Session;

    async fn launch(&self) -> Result<Self::Session>;
}

/// One running browser.
#[async_trait]
pub trait Session: Send {
    type Page: Page;

    async fn new_page(&mut self) -> Result<Self::Page>;

    /// Shut the browser down. Called on every path out of a tick.
    async fn close(self) -> Result<()>;
}

/// Locate a Chromium binary: `SEAT_FINDER_CHROMIUM`, then `PATH`, then the usual macOS location.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SEAT_FINDER_CHROMIUM") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("SEAT_FINDER_CHROMIUM points at {}, which does not exist", path.display());
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome/Chromium or set SEAT_FINDER_CHROMIUM.")?;
        debug!("Launching {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1366, 900);
        builder = if self.headless {
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

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Chromium handler event error: {}", e);
                }
            }
        });

        info!("Browser session started (headless: {})", self.headless);
        Ok(ChromiumSession { browser, handler })
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

#[async_trait]
impl Session for ChromiumSession {
    type Page = ChromiumPage;

    async fn new_page(&mut self) -> Result<ChromiumPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        ChromiumPage::attach(page)
            .await
            .context("failed to watch page network traffic")
    }

    async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        self.handler.abort();
        closed.context("failed to close Chromium")?;
        info!("Browser session closed");
        Ok(())
    }
}
