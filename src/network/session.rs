// * Browser Session
// * One headless browser and one reused page per batch, behind a trait seam so the
// * controller can be driven by fixture pages in tests.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::network::errors::SessionError;
use crate::refinery::PageSnapshot;

pub type SessionFuture<'a, T> = BoxFuture<'a, Result<T, SessionError>>;

/// A live page that can be pointed at successive result URLs
pub trait PortalSession: Send + Sync {
    /// Navigates and waits for the load event, bounded by the navigation timeout
    fn navigate<'a>(&'a self, url: &'a str) -> SessionFuture<'a, ()>;

    /// Serializes the current DOM
    fn snapshot(&self) -> SessionFuture<'_, PageSnapshot>;

    /// Releases the page and the browser process
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Opens one session per batch
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> SessionFuture<'_, Box<dyn PortalSession>>;
}

/// Launch parameters for the chromium-backed session
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    executable: Option<PathBuf>,
    headless: bool,
    viewport: (u32, u32),
    navigation_timeout: Duration,
}

impl ChromiumSessionFactory {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            executable: settings.resolve_browser_executable(),
            headless: settings.headless,
            viewport: (settings.viewport_width, settings.viewport_height),
            navigation_timeout: settings.navigation_timeout(),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, SessionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.viewport.0, self.viewport.1)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars");

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(SessionError::BrowserLaunch)
    }

    async fn launch(&self) -> Result<ChromiumSession, SessionError> {
        let config = self.browser_config()?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::BrowserLaunch(e.to_string()))?;

        // * The handler drives the CDP connection; it ends when the browser goes away
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(SessionError::BrowserLaunch(e.to_string()));
            }
        };

        info!(
            executable = ?self.executable,
            headless = self.headless,
            "Browser session launched"
        );

        Ok(ChromiumSession {
            browser: Mutex::new(browser),
            page,
            handler_task,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

impl SessionFactory for ChromiumSessionFactory {
    fn open(&self) -> SessionFuture<'_, Box<dyn PortalSession>> {
        Box::pin(async move {
            let session = self.launch().await?;
            Ok(Box::new(session) as Box<dyn PortalSession>)
        })
    }
}

pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    // * A dead handler or a broken transport means the browser is gone
    fn map_cdp_error(&self, error: CdpError, soft: fn(String) -> SessionError) -> SessionError {
        let transport_lost = matches!(error, CdpError::Ws(_) | CdpError::ChannelSendError(_));
        if transport_lost || self.handler_task.is_finished() {
            SessionError::BrowserCrash(error.to_string())
        } else {
            soft(error.to_string())
        }
    }
}

impl PortalSession for ChromiumSession {
    fn navigate<'a>(&'a self, url: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(self.map_cdp_error(e, SessionError::Navigation)),
                Err(_) => Err(SessionError::Timeout(self.navigation_timeout.as_millis() as u64)),
            }
        })
    }

    fn snapshot(&self) -> SessionFuture<'_, PageSnapshot> {
        Box::pin(async move {
            let url = self
                .page
                .url()
                .await
                .map_err(|e| self.map_cdp_error(e, SessionError::ContentRead))?
                .unwrap_or_default();

            let html = self
                .page
                .content()
                .await
                .map_err(|e| self.map_cdp_error(e, SessionError::ContentRead))?;

            Ok(PageSnapshot::new(url, html))
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let ChromiumSession {
                browser,
                page,
                handler_task,
                ..
            } = *self;

            if let Err(e) = page.close().await {
                debug!(error = %e, "Page close failed");
            }

            let mut browser = browser.into_inner();
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser close failed");
            }

            handler_task.abort();
            info!("Browser session closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_takes_settings() {
        let settings = EngineSettings {
            browser_executable: Some(PathBuf::from("/opt/chrome/chrome")),
            headless: false,
            viewport_width: 800,
            viewport_height: 600,
            navigation_timeout_ms: 1_000,
            ..Default::default()
        };

        let factory = ChromiumSessionFactory::new(&settings);
        assert_eq!(factory.executable, Some(PathBuf::from("/opt/chrome/chrome")));
        assert!(!factory.headless);
        assert_eq!(factory.viewport, (800, 600));
        assert_eq!(factory.navigation_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_browser_config_builds_with_explicit_executable() {
        let settings = EngineSettings {
            browser_executable: Some(PathBuf::from("/opt/chrome/chrome")),
            ..Default::default()
        };
        assert!(ChromiumSessionFactory::new(&settings).browser_config().is_ok());
    }
}
