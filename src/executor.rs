use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{AppConfig, Selectors};
use crate::engine::{parse_card_identifier, title_matches};
use crate::error::BotError;
use crate::state::PendingOrders;
use crate::surface::Interact;
use crate::types::{AcceptanceReport, OrderCard};

/// Listing page, title filters and waits for the acceptance pass.
#[derive(Debug, Clone)]
pub struct AcceptorSettings {
    pub listing_url: String,
    pub title_filters: Vec<String>,
    pub listing_attempts: u32,
    pub click_settle: Duration,
}

impl AcceptorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            listing_url: config.marketplace.home_url.clone(),
            title_filters: config.marketplace.title_filters.clone(),
            listing_attempts: config.settings.listing_attempts,
            click_settle: config.settings.click_settle(),
        }
    }
}

/// Why a card was or was not claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CardDecision {
    AcceptPending(String),
    AcceptTitle(String),
    Skip(String),
}

/// Claims marketplace orders whose cards match the pending ids or title filters.
pub struct OrderAcceptor<'a, S: Interact> {
    surface: &'a S,
    settings: AcceptorSettings,
    selectors: Selectors,
}

impl<'a, S: Interact> OrderAcceptor<'a, S> {
    pub fn new(surface: &'a S, settings: AcceptorSettings, selectors: Selectors) -> Self {
        Self {
            surface,
            settings,
            selectors,
        }
    }

    /// Load the listing, open the available-orders tab and wait for cards.
    ///
    /// Returns an empty list when nothing rendered within the attempt budget;
    /// only a failed page load is an error.
    pub async fn scan_cards(&self) -> Result<Vec<OrderCard<S::Element>>, BotError> {
        self.surface
            .navigate(&self.settings.listing_url)
            .await
            .map_err(|e| BotError::ListingUnavailable(e.to_string()))?;

        match self.surface.query_single(&self.selectors.orders_tab).await {
            Ok(tab) => {
                if let Err(e) = self.surface.click_via_script(&tab).await {
                    warn!("Failed to open available orders tab: {e}");
                }
            }
            Err(e) => warn!("Available orders tab missing: {e}"),
        }

        let attempts = self.settings.listing_attempts;
        let mut elements = Vec::new();
        for attempt in 1..=attempts {
            self.surface.wait_settle(self.settings.click_settle).await;
            match self.surface.query_all(&self.selectors.order_cards).await {
                Ok(found) if !found.is_empty() => {
                    elements = found;
                    break;
                }
                Ok(_) => debug!("No order cards rendered yet (attempt {attempt}/{attempts})"),
                Err(e) => warn!("Order card query failed (attempt {attempt}/{attempts}): {e}"),
            }
        }

        let mut cards = Vec::with_capacity(elements.len());
        for element in &elements {
            cards.push(self.read_card(element).await);
        }
        Ok(cards)
    }

    async fn read_card(&self, element: &S::Element) -> OrderCard<S::Element> {
        let identifier = match self.child_text(element, &self.selectors.card_identifier).await {
            Some(text) => parse_card_identifier(&text),
            None => None,
        };
        let title = self.child_text(element, &self.selectors.card_title).await;
        let accept = match self.surface.query_within(element, &self.selectors.card_accept).await {
            Ok(control) => control,
            Err(e) => {
                warn!("Accept control lookup failed: {e}");
                None
            }
        };
        OrderCard {
            identifier,
            title,
            accept,
        }
    }

    async fn child_text(&self, element: &S::Element, selector: &str) -> Option<String> {
        match self.surface.query_within(element, selector).await {
            Ok(Some(child)) => match self.surface.text(&child).await {
                Ok(text) => Some(text.trim().to_string()),
                Err(e) => {
                    warn!("Failed to read `{selector}` text: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to query `{selector}`: {e}");
                None
            }
        }
    }

    fn decide(&self, card: &OrderCard<S::Element>, pending: &PendingOrders) -> CardDecision {
        if let Some(id) = &card.identifier {
            if pending.contains(id) {
                return CardDecision::AcceptPending(id.clone());
            }
        }
        if let Some(title) = &card.title {
            if title_matches(title, &self.settings.title_filters) {
                return CardDecision::AcceptTitle(title.clone());
            }
        }
        let label = card
            .identifier
            .clone()
            .or_else(|| card.title.clone())
            .unwrap_or_else(|| "<unreadable card>".into());
        CardDecision::Skip(label)
    }

    /// Claim every visible card matching `pending` or a title filter.
    pub async fn accept_orders(&self, pending: &PendingOrders) -> Result<AcceptanceReport, BotError> {
        let cards = self.scan_cards().await?;
        let mut report = AcceptanceReport::default();

        if cards.is_empty() {
            info!("No orders currently available");
        }

        for card in &cards {
            let label = match self.decide(card, pending) {
                CardDecision::AcceptPending(id) => id,
                CardDecision::AcceptTitle(title) => title,
                CardDecision::Skip(label) => {
                    info!("Skipping order {label}: not pending");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.claim(card).await {
                Ok(()) => {
                    info!("Order {label} accepted");
                    report.accepted += 1;
                    report.accepted_ids.push(card.identifier.clone().unwrap_or(label));
                }
                Err(e) => {
                    warn!("Failed to accept order {label}: {e}");
                    report.failed += 1;
                }
            }
        }

        report.unclaimed = pending
            .ids()
            .iter()
            .filter(|id| {
                !cards
                    .iter()
                    .any(|c| c.identifier.as_deref().is_some_and(|cid| id.matches(cid)))
            })
            .map(|id| id.to_string())
            .collect();
        if !report.unclaimed.is_empty() {
            warn!("Pending order(s) not on the listing: {:?}", report.unclaimed);
        }

        info!(
            "Total orders accepted: {} (skipped {}, failed {})",
            report.accepted, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Click accept, wait for the dialog, click confirm.
    async fn claim(&self, card: &OrderCard<S::Element>) -> Result<(), BotError> {
        let accept = card
            .accept
            .as_ref()
            .ok_or_else(|| BotError::surface(&self.selectors.card_accept, "element not found"))?;
        self.surface.click_via_script(accept).await?;
        self.surface.wait_settle(self.settings.click_settle).await;

        let confirm = self.surface.query_single(&self.selectors.confirm).await?;
        self.surface.click_via_script(&confirm).await
    }
}
