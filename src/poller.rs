use tracing::{debug, info, warn};

use crate::auth::{OperatorPrompt, SessionGuard};
use crate::collector::MessageCollector;
use crate::config::SiteConfig;
use crate::engine::{KeywordSet, extract_order_id, match_message};
use crate::error::BotError;
use crate::state::{PendingOrders, SeenMessages};
use crate::surface::Interact;
use crate::types::{MatchPolicy, RawMessage};

/// Counters for one sweep over all channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub new_messages: usize,
    pub matched: usize,
    pub extracted: usize,
    pub extraction_failures: usize,
}

/// Sweeps chat channels until announcements yield new order ids.
///
/// One sweep: load the server in a fresh tab and validate the chat session
/// from it, then for each channel in declaration order select it, read its
/// broadcasts, skip already-seen ones, match and extract. The loop never
/// sleeps between sweeps; the page settle waits inside a sweep pace it.
///
/// Extracted ids stay pending until a poll hands them over, so a sweep that
/// fails halfway loses nothing.
pub struct PollingLoop<'a, S: Interact> {
    guard: SessionGuard<'a, S>,
    collector: MessageCollector<'a, S>,
    site: SiteConfig,
    channels: Vec<String>,
    keywords: KeywordSet,
    policy: MatchPolicy,
    seen: SeenMessages,
    pending: PendingOrders,
    sweeps: u64,
    orders_extracted: u64,
    extraction_failures: u64,
}

impl<'a, S: Interact> PollingLoop<'a, S> {
    pub fn new(
        guard: SessionGuard<'a, S>,
        collector: MessageCollector<'a, S>,
        site: SiteConfig,
        channels: Vec<String>,
        keywords: KeywordSet,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            guard,
            collector,
            site,
            channels,
            keywords,
            policy,
            seen: SeenMessages::new(),
            pending: PendingOrders::new(),
            sweeps: 0,
            orders_extracted: 0,
            extraction_failures: 0,
        }
    }

    /// Block until at least one new order id is extracted, then hand the set over.
    pub async fn poll_until_new_orders(
        &mut self,
        prompt: &dyn OperatorPrompt,
    ) -> Result<PendingOrders, BotError> {
        info!("Waiting for messages...");
        loop {
            if !self.pending.is_empty() {
                info!("Found {} new order id(s)", self.pending.len());
                return Ok(self.pending.take());
            }
            self.sweep(prompt).await?;
        }
    }

    /// Return orders the acceptance pass could not consume. They are handed
    /// over again, ahead of newer ids, by the next poll.
    pub fn requeue(&mut self, orders: PendingOrders) {
        if orders.is_empty() {
            return;
        }
        info!("Requeued {} order id(s)", orders.len());
        let newer = self.pending.take();
        self.pending = orders;
        for id in newer.ids() {
            self.pending.push(id.clone());
        }
    }

    /// One pass over every channel. Extracted ids accumulate in the pending set.
    pub async fn sweep(&mut self, prompt: &dyn OperatorPrompt) -> Result<SweepOutcome, BotError> {
        self.sweeps += 1;
        self.collector.load_server().await?;
        if let Err(err) = self.guard.check_current(&self.site).await {
            if !matches!(err, BotError::SessionExpired { .. }) {
                return Err(err);
            }
            // the site's session policy decides; a recovered session needs a clean load
            self.guard.ensure_login(&self.site, prompt).await?;
            self.collector.load_server().await?;
        }

        let mut outcome = SweepOutcome::default();
        for channel in self.channels.clone() {
            self.collector.select_channel(&channel).await?;
            let messages = match self.collector.read_messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Failed to read messages in '{channel}': {e}");
                    continue;
                }
            };
            info!("Reading {} message(s) in '{channel}'", messages.len());
            self.evaluate(&messages, &mut outcome);
        }

        if self.pending.is_empty() {
            debug!("No new orders found (seen: {} messages)", self.seen.len());
        }
        Ok(outcome)
    }

    /// Dedup, match and extract a batch of messages.
    fn evaluate(&mut self, messages: &[RawMessage], outcome: &mut SweepOutcome) {
        for message in messages {
            if !self.seen.insert(&message.normalized) {
                continue;
            }
            outcome.new_messages += 1;

            let result = match_message(&message.normalized, &self.keywords, self.policy);
            if !result.matched {
                debug!(
                    "No keyword match ({}/{} words): {}",
                    result.words_found, result.words_total, message.normalized
                );
                continue;
            }
            outcome.matched += 1;
            info!("New message: {}", message.normalized);

            match extract_order_id(&message.text) {
                Ok(id) => {
                    info!("Extracted order id {id}");
                    outcome.extracted += 1;
                    self.orders_extracted += 1;
                    self.pending.push(id);
                }
                Err(e) => {
                    warn!("Matched message not actionable ({e}): {}", message.normalized);
                    outcome.extraction_failures += 1;
                    self.extraction_failures += 1;
                }
            }
        }
    }

    pub fn pending(&self) -> &PendingOrders {
        &self.pending
    }

    pub fn seen(&self) -> &SeenMessages {
        &self.seen
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn orders_extracted(&self) -> u64 {
        self.orders_extracted
    }

    pub fn extraction_failures(&self) -> u64 {
        self.extraction_failures
    }
}
