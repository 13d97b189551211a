//! Chrome over CDP, via chromiumoxide.
//!
//! One page is driven at a time. `open_fresh` swaps it for a new tab, which
//! clears the stale render state the chat client accumulates.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::BotError;
use crate::surface::{Interact, Navigate};

/// Placeholder selector used in errors raised on an element handle.
const ELEMENT: &str = "<element>";

/// Launch options for Chrome.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub profile_dir: Option<PathBuf>,
    pub executable: Option<PathBuf>,
}

impl BrowserOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            headless: config.settings.headless,
            profile_dir: config.settings.profile_dir.clone(),
            executable: config.settings.chrome_executable.clone(),
        }
    }
}

/// Cookie as persisted in a site's cookie artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Seconds since the epoch; non-positive for session cookies.
    #[serde(default)]
    pub expires: f64,
}

impl StoredCookie {
    pub fn is_expired(&self, now_secs: f64) -> bool {
        self.expires > 0.0 && self.expires < now_secs
    }
}

pub struct ChromeSurface {
    browser: Browser,
    page: Mutex<Page>,
    handler_task: JoinHandle<()>,
}

impl ChromeSurface {
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if !options.headless {
            builder = builder.with_head().window_size(1280, 900);
        }
        if let Some(dir) = &options.profile_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        info!(
            headless = options.headless,
            profile = ?options.profile_dir,
            "Launching Chrome"
        );
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chrome")?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open initial tab")?;

        Ok(Self {
            browser,
            page: Mutex::new(page),
            handler_task,
        })
    }

    async fn page(&self) -> Page {
        self.page.lock().await.clone()
    }

    /// Write the cookies visible to the current page to `path`.
    pub async fn save_cookies(&self, path: &Path) -> Result<usize> {
        let cookies = self
            .page()
            .await
            .get_cookies()
            .await
            .context("failed to read cookies")?;
        let stored: Vec<StoredCookie> = cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
                expires: c.expires,
            })
            .collect();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&stored).context("failed to serialize cookies")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        debug!("Saved {} cookie(s) to {}", stored.len(), path.display());
        Ok(stored.len())
    }

    /// Load a cookie artifact into the browser. Returns `Ok(None)` if the
    /// file does not exist.
    pub async fn restore_cookies(&self, path: &Path) -> Result<Option<usize>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let stored: Vec<StoredCookie> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let now = chrono::Utc::now().timestamp() as f64;
        let mut params = Vec::with_capacity(stored.len());
        for cookie in stored.into_iter().filter(|c| !c.is_expired(now)) {
            let param = CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .domain(cookie.domain)
                .path(cookie.path)
                .secure(cookie.secure)
                .http_only(cookie.http_only)
                .build()
                .map_err(|e| anyhow!("invalid stored cookie: {e}"))?;
            params.push(param);
        }

        let count = params.len();
        if count > 0 {
            self.page()
                .await
                .set_cookies(params)
                .await
                .context("failed to set cookies")?;
        }
        info!("Restored {count} cookie(s) from {}", path.display());
        Ok(Some(count))
    }

    /// Close Chrome and stop the CDP handler.
    pub async fn shutdown(self) {
        let mut browser = self.browser;
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {e}");
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl Navigate for ChromeSurface {
    async fn navigate(&self, url: &str) -> Result<(), BotError> {
        self.page()
            .await
            .goto(url)
            .await
            .map_err(|e| BotError::surface(url, format!("navigation failed: {e}")))?;
        Ok(())
    }

    async fn open_fresh(&self, url: &str) -> Result<(), BotError> {
        let fresh = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| BotError::surface(url, format!("failed to open tab: {e}")))?;
        let old = std::mem::replace(&mut *self.page.lock().await, fresh);
        if let Err(e) = old.close().await {
            debug!("Failed to close previous tab: {e}");
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BotError> {
        let url = self
            .page()
            .await
            .url()
            .await
            .map_err(|e| BotError::surface("location", e))?;
        Ok(url.unwrap_or_default())
    }
}

#[async_trait]
impl Interact for ChromeSurface {
    type Element = Element;

    async fn query_single(&self, selector: &str) -> Result<Element, BotError> {
        self.page()
            .await
            .find_element(selector)
            .await
            .map_err(|e| BotError::surface(selector, e))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Element>, BotError> {
        self.page()
            .await
            .find_elements(selector)
            .await
            .map_err(|e| BotError::surface(selector, e))
    }

    async fn query_within(&self, parent: &Element, selector: &str) -> Result<Option<Element>, BotError> {
        match parent.find_element(selector).await {
            Ok(element) => Ok(Some(element)),
            Err(e) => {
                debug!("`{selector}` not found in element: {e}");
                Ok(None)
            }
        }
    }

    async fn text(&self, element: &Element) -> Result<String, BotError> {
        let text = element
            .inner_text()
            .await
            .map_err(|e| BotError::surface(ELEMENT, e))?;
        Ok(text.unwrap_or_default())
    }

    async fn click(&self, element: &Element) -> Result<(), BotError> {
        element
            .click()
            .await
            .map_err(|e| BotError::surface(ELEMENT, e))?;
        Ok(())
    }

    async fn click_via_script(&self, element: &Element) -> Result<(), BotError> {
        element
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| BotError::surface(ELEMENT, e))?;
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<(), BotError> {
        self.click(element).await?;
        element
            .type_str(text)
            .await
            .map_err(|e| BotError::surface(ELEMENT, e))?;
        Ok(())
    }

    async fn run_script(&self, code: &str) -> Result<Value, BotError> {
        let result = self
            .page()
            .await
            .evaluate(code)
            .await
            .map_err(|e| BotError::surface("<script>", e))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}
