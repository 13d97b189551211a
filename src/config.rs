use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::types::{MatchPolicy, SessionPolicy};
use crate::{BROADCAST_MARKER, FACTORY_HOME_URL, FACTORY_LOGIN_URL, LOGIN_PATH_MARKER};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub selectors: Selectors,
}

/// Marketplace credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AccountConfig {
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

/// Order marketplace site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_factory_home")]
    pub home_url: String,
    #[serde(default = "default_factory_login")]
    pub login_url: String,
    #[serde(default = "default_login_marker")]
    pub login_marker: String,
    #[serde(default = "default_factory_cookies")]
    pub cookie_file: PathBuf,
    #[serde(default = "default_prompt_policy")]
    pub session_policy: SessionPolicy,
    /// Card titles accepted without a chat announcement.
    #[serde(default)]
    pub title_filters: Vec<String>,
}

/// Chat server watched for announcements. Unused with `--factory-only`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_login_marker")]
    pub login_marker: String,
    #[serde(default = "default_chat_cookies")]
    pub cookie_file: PathBuf,
    #[serde(default = "default_stop_policy")]
    pub session_policy: SessionPolicy,
    #[serde(default = "default_broadcast_marker")]
    pub broadcast_marker: String,
    /// Number of most recent messages read per channel.
    #[serde(default = "default_message_window")]
    pub message_window: usize,
}

/// Keyword phrases and how they match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default)]
    pub phrases: Vec<String>,
    /// One phrase per line; appended after `phrases`.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub policy: MatchPolicy,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Chrome user data directory; keeps the chat login across runs.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Pause between listing scans in `--factory-only` mode.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_page_settle_ms")]
    pub page_settle_ms: u64,
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,
    #[serde(default = "default_channel_retry_attempts")]
    pub channel_retry_attempts: u32,
    #[serde(default = "default_channel_retry_backoff_ms")]
    pub channel_retry_backoff_ms: u64,
    #[serde(default = "default_listing_attempts")]
    pub listing_attempts: u32,
    #[serde(default = "default_max_login_prompts")]
    pub max_login_prompts: u32,
    #[serde(default = "default_zoom_percent")]
    pub zoom_percent: u32,
}

/// CSS selectors for both sites. `{channel}` and `{window}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub chat_channel: String,
    pub chat_messages: String,
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,
    pub orders_tab: String,
    pub order_cards: String,
    pub card_identifier: String,
    pub card_title: String,
    pub card_accept: String,
    pub confirm: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            chat_channel: r#"[data-dnd-name="{channel}"] a"#.into(),
            chat_messages: r#"[data-list-id="chat-messages"] > li:nth-last-child(-n+{window}) h3 + div"#
                .into(),
            login_username: "input#uName".into(),
            login_password: "input[type='password'][name='uPassword']".into(),
            login_submit: "button[type='submit']".into(),
            orders_tab: ".orders .nav.nav-tabs > li:first-child a".into(),
            order_cards: "div#availableOrders .orders-preloader + div".into(),
            card_identifier: ".order-date".into(),
            card_title: "h3".into(),
            card_accept: "button.btn.order-accept-btn.btn-for-bright".into(),
            confirm: ".answer-btn".into(),
        }
    }
}

impl Selectors {
    pub fn channel(&self, name: &str) -> String {
        self.chat_channel.replace("{channel}", name)
    }

    pub fn messages(&self, window: usize) -> String {
        self.chat_messages.replace("{window}", &window.to_string())
    }
}

fn default_factory_home() -> String {
    FACTORY_HOME_URL.into()
}

fn default_factory_login() -> String {
    FACTORY_LOGIN_URL.into()
}

fn default_login_marker() -> String {
    LOGIN_PATH_MARKER.into()
}

fn default_factory_cookies() -> PathBuf {
    PathBuf::from("cookies/factory.json")
}

fn default_chat_cookies() -> PathBuf {
    PathBuf::from("cookies/chat.json")
}

fn default_prompt_policy() -> SessionPolicy {
    SessionPolicy::Prompt
}

fn default_stop_policy() -> SessionPolicy {
    SessionPolicy::Stop
}

fn default_broadcast_marker() -> String {
    BROADCAST_MARKER.into()
}

fn default_message_window() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_page_settle_ms() -> u64 {
    8_000
}

fn default_click_settle_ms() -> u64 {
    1_000
}

fn default_channel_retry_attempts() -> u32 {
    5
}

fn default_channel_retry_backoff_ms() -> u64 {
    5_000
}

fn default_listing_attempts() -> u32 {
    10
}

fn default_max_login_prompts() -> u32 {
    3
}

fn default_zoom_percent() -> u32 {
    50
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            home_url: default_factory_home(),
            login_url: default_factory_login(),
            login_marker: default_login_marker(),
            cookie_file: default_factory_cookies(),
            session_policy: default_prompt_policy(),
            title_filters: Vec::new(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            channels: Vec::new(),
            login_marker: default_login_marker(),
            cookie_file: default_chat_cookies(),
            session_policy: default_stop_policy(),
            broadcast_marker: default_broadcast_marker(),
            message_window: default_message_window(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            headless: default_true(),
            profile_dir: None,
            chrome_executable: None,
            poll_interval_ms: default_poll_interval_ms(),
            page_settle_ms: default_page_settle_ms(),
            click_settle_ms: default_click_settle_ms(),
            channel_retry_attempts: default_channel_retry_attempts(),
            channel_retry_backoff_ms: default_channel_retry_backoff_ms(),
            listing_attempts: default_listing_attempts(),
            max_login_prompts: default_max_login_prompts(),
            zoom_percent: default_zoom_percent(),
        }
    }
}

impl SettingsConfig {
    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn channel_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.channel_retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Login-check parameters for one site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub home_url: String,
    pub login_marker: String,
    pub policy: SessionPolicy,
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply `.env`-style overrides read through `lookup`.
    ///
    /// Recognized: `SHOW_BROWSER`, `KEYWORDS`, `KEYWORDS_FILE`,
    /// `FACTORY_USERNAME`, `FACTORY_PASSWORD`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(show) = lookup("SHOW_BROWSER") {
            self.settings.headless = !show.trim().eq_ignore_ascii_case("true");
        }
        if let Some(keywords) = lookup("KEYWORDS") {
            self.keywords.phrases = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(file) = lookup("KEYWORDS_FILE") {
            self.keywords.file = Some(PathBuf::from(file));
        }
        if let Some(username) = lookup("FACTORY_USERNAME") {
            self.account.username = username;
        }
        if let Some(password) = lookup("FACTORY_PASSWORD") {
            self.account.password = password;
        }
    }

    /// Inline phrases followed by the phrases of the keyword file, if any.
    pub fn resolve_keywords(&self) -> Result<Vec<String>> {
        let mut phrases: Vec<String> = self
            .keywords
            .phrases
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(path) = &self.keywords.file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read keyword file {}", path.display()))?;
            phrases.extend(parse_keyword_lines(&contents));
        }
        Ok(phrases)
    }

    /// Check the settings the loops rely on.
    pub fn validate(&self, require_chat: bool) -> Result<()> {
        if require_chat {
            if self.chat.server_url.trim().is_empty() {
                bail!("chat.server_url must be set");
            }
            url::Url::parse(&self.chat.server_url)
                .with_context(|| format!("invalid chat.server_url {}", self.chat.server_url))?;
            if self.chat.channels.is_empty() {
                bail!("chat.channels must name at least one channel");
            }
            let mut names = HashSet::new();
            for channel in &self.chat.channels {
                if channel.trim().is_empty() {
                    bail!("chat.channels contains an empty name");
                }
                if !names.insert(channel.as_str()) {
                    bail!("chat.channels lists '{channel}' twice");
                }
            }
            if self.chat.message_window == 0 {
                bail!("chat.message_window must be positive");
            }
        }
        url::Url::parse(&self.marketplace.home_url)
            .with_context(|| format!("invalid marketplace.home_url {}", self.marketplace.home_url))?;
        if self.settings.channel_retry_attempts == 0 {
            bail!("settings.channel_retry_attempts must be positive");
        }
        if self.settings.listing_attempts == 0 {
            bail!("settings.listing_attempts must be positive");
        }
        Ok(())
    }

    pub fn chat_site(&self) -> SiteConfig {
        SiteConfig {
            name: "chat".into(),
            home_url: self.chat.server_url.clone(),
            login_marker: self.chat.login_marker.clone(),
            policy: self.chat.session_policy,
        }
    }

    pub fn marketplace_site(&self) -> SiteConfig {
        SiteConfig {
            name: "marketplace".into(),
            home_url: self.marketplace.home_url.clone(),
            login_marker: self.marketplace.login_marker.clone(),
            policy: self.marketplace.session_policy,
        }
    }
}

/// One phrase per line; blank lines and `#` comments are ignored.
pub fn parse_keyword_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
