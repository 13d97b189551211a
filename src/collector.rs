use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{AppConfig, Selectors};
use crate::engine::is_broadcast;
use crate::error::BotError;
use crate::surface::Interact;
use crate::types::RawMessage;

/// Timing and retry budget for channel reads.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub server_url: String,
    pub broadcast_marker: String,
    pub message_window: usize,
    pub page_settle: Duration,
    pub click_settle: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub zoom_percent: u32,
}

impl CollectorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            server_url: config.chat.server_url.clone(),
            broadcast_marker: config.chat.broadcast_marker.clone(),
            message_window: config.chat.message_window,
            page_settle: config.settings.page_settle(),
            click_settle: config.settings.click_settle(),
            retry_attempts: config.settings.channel_retry_attempts,
            retry_backoff: config.settings.channel_retry_backoff(),
            zoom_percent: config.settings.zoom_percent,
        }
    }
}

/// Reads the latest broadcast messages of a chat channel.
pub struct MessageCollector<'a, S: Interact> {
    surface: &'a S,
    settings: CollectorSettings,
    selectors: Selectors,
}

impl<'a, S: Interact> MessageCollector<'a, S> {
    pub fn new(surface: &'a S, settings: CollectorSettings, selectors: Selectors) -> Self {
        Self {
            surface,
            settings,
            selectors,
        }
    }

    /// Open the chat server in a fresh tab and let it render.
    pub async fn load_server(&self) -> Result<(), BotError> {
        self.surface.open_fresh(&self.settings.server_url).await?;
        if self.settings.zoom_percent != 100 {
            let zoom = format!(
                "document.body.style.zoom = '{}%'",
                self.settings.zoom_percent
            );
            if let Err(e) = self.surface.run_script(&zoom).await {
                debug!("Zoom not applied: {e}");
            }
        }
        self.surface.wait_settle(self.settings.page_settle).await;
        Ok(())
    }

    /// Activate a channel, reloading the server between failed attempts.
    pub async fn select_channel(&self, channel: &str) -> Result<(), BotError> {
        let selector = self.selectors.channel(channel);
        let attempts = self.settings.retry_attempts;
        info!("Loading channel '{channel}'...");

        for attempt in 1..=attempts {
            let result = match self.surface.query_single(&selector).await {
                Ok(control) => self.surface.click_via_script(&control).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    self.surface.wait_settle(self.settings.click_settle).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Error opening channel '{channel}' (attempt {attempt}/{attempts}): {e}; retrying in {:?}",
                        self.settings.retry_backoff
                    );
                    if attempt < attempts {
                        self.surface.wait_settle(self.settings.retry_backoff).await;
                        self.load_server().await?;
                    }
                }
            }
        }

        Err(BotError::ChannelNotFound {
            channel: channel.to_string(),
            attempts,
        })
    }

    /// Text of the last `message_window` messages in the open channel,
    /// keeping only broadcasts.
    pub async fn read_messages(&self) -> Result<Vec<RawMessage>, BotError> {
        let selector = self.selectors.messages(self.settings.message_window);
        let script = read_script(&selector);
        let value = self.surface.run_script(&script).await?;

        let texts: Vec<String> = serde_json::from_value(value)
            .map_err(|e| BotError::surface(&selector, format!("unexpected script result: {e}")))?;

        let messages: Vec<RawMessage> = texts
            .iter()
            .filter(|text| is_broadcast(text, &self.settings.broadcast_marker))
            .map(|text| RawMessage::new(text))
            .collect();
        debug!(
            "Read {} message(s), {} broadcast",
            texts.len(),
            messages.len()
        );
        Ok(messages)
    }

    /// Select `channel` and read its broadcasts.
    pub async fn collect_messages(&self, channel: &str) -> Result<Vec<RawMessage>, BotError> {
        self.select_channel(channel).await?;
        self.read_messages().await
    }
}

fn read_script(selector: &str) -> String {
    let selector = serde_json::Value::from(selector).to_string();
    format!(
        "(() => Array.from(document.querySelectorAll({selector})).map(m => m.textContent))()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::fake::FakeSurface;

    const SERVER: &str = "https://discord.com/channels/123";

    fn settings() -> CollectorSettings {
        CollectorSettings {
            server_url: SERVER.into(),
            broadcast_marker: "@everyone".into(),
            message_window: 8,
            page_settle: Duration::ZERO,
            click_settle: Duration::ZERO,
            retry_attempts: 3,
            retry_backoff: Duration::ZERO,
            zoom_percent: 50,
        }
    }

    #[tokio::test]
    async fn collects_only_broadcasts_normalized() {
        let surface = FakeSurface::new();
        let selectors = Selectors::default();
        surface.add_channel(
            &selectors.channel("orders"),
            "orders",
            &["@everyone New Job\nOrder ID: Z1", "just chatting", "@everyone gg"],
        );
        let collector = MessageCollector::new(&surface, settings(), selectors);

        let messages = collector.collect_messages("orders").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "@everyone New Job Order ID: Z1");
        assert_eq!(messages[0].normalized, "@everyone new job order id: z1");
        assert_eq!(messages[1].normalized, "@everyone gg");
        assert_eq!(surface.clicks(), vec!["channel:orders".to_string()]);
    }

    #[tokio::test]
    async fn read_script_targets_message_window() {
        let surface = FakeSurface::new();
        let selectors = Selectors::default();
        surface.add_channel(&selectors.channel("orders"), "orders", &[]);
        let collector = MessageCollector::new(&surface, settings(), selectors);

        collector.collect_messages("orders").await.unwrap();
        let scripts = surface.scripts();
        let read = scripts.last().unwrap();
        assert!(read.contains("nth-last-child(-n+8)"));
        assert!(read.contains("textContent"));
    }

    #[tokio::test]
    async fn channel_selection_retries_with_reload() {
        let surface = FakeSurface::new();
        let selectors = Selectors::default();
        let selector = selectors.channel("orders");
        surface.add_channel(&selector, "orders", &["@everyone hi"]);
        surface.hide_for(&selector, 2);
        let collector = MessageCollector::new(&surface, settings(), selectors);

        let messages = collector.collect_messages("orders").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(surface.fresh_loads(), 2);
    }

    #[tokio::test]
    async fn missing_channel_is_fatal_after_budget() {
        let surface = FakeSurface::new();
        let collector = MessageCollector::new(&surface, settings(), Selectors::default());

        let err = collector.collect_messages("typo-channel").await.unwrap_err();
        match err {
            BotError::ChannelNotFound { channel, attempts } => {
                assert_eq!(channel, "typo-channel");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // reload between attempts, none after the last
        assert_eq!(surface.fresh_loads(), 2);
    }

    #[tokio::test]
    async fn load_server_applies_zoom() {
        let surface = FakeSurface::new();
        let collector = MessageCollector::new(&surface, settings(), Selectors::default());
        collector.load_server().await.unwrap();
        assert_eq!(surface.navigations(), vec![SERVER.to_string()]);
        assert!(surface.scripts()[0].contains("zoom = '50%'"));
    }
}
