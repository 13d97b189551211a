use serde::{Deserialize, Serialize};

/// How many words of a keyword phrase must appear for it to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every word of the phrase must appear.
    #[default]
    Exact,
    /// At most one word of the phrase may be missing.
    Lenient,
}

impl MatchPolicy {
    pub fn fires(self, words_found: usize, words_total: usize) -> bool {
        match self {
            MatchPolicy::Exact => words_found == words_total,
            MatchPolicy::Lenient => words_found + 1 >= words_total,
        }
    }
}

/// What to do when a site shows its login page instead of the home page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// Stop the process; the operator has to log in again manually.
    Stop,
    /// Ask the operator to log in in the open browser, then validate again.
    Prompt,
}

/// Outcome of scoring one message against the keyword set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub message: String,
    pub matched: bool,
    pub words_found: usize,
    pub words_total: usize,
    /// Firing keyword, or the best-scoring one when nothing fired.
    pub keyword: Option<String>,
}

/// A broadcast message read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Line breaks collapsed, original casing.
    pub text: String,
    /// `text` lower-cased; used for dedup and matching.
    pub normalized: String,
}

impl RawMessage {
    pub fn new(content: &str) -> Self {
        let text = content
            .replace("\r\n", " ")
            .replace(['\n', '\r'], " ");
        let normalized = text.to_lowercase();
        Self { text, normalized }
    }
}

/// Marketplace order identifier as announced in chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Listing and chat disagree on casing often enough that equality ignores it.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One rendered posting on the marketplace listing. Valid for a single pass only.
#[derive(Debug, Clone)]
pub struct OrderCard<E> {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub accept: Option<E>,
}

/// Summary of one acceptance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcceptanceReport {
    pub accepted: u32,
    pub skipped: u32,
    /// Matched cards whose accept or confirm interaction failed.
    pub failed: u32,
    pub accepted_ids: Vec<String>,
    /// Pending ids that no visible card carried.
    pub unclaimed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    /// Chat announcements produced new order ids.
    OrdersAnnounced,
    /// Periodic listing scan without chat input.
    ListingScan,
}

/// Emitted once per acceptance pass.
#[derive(Debug, Clone, Serialize)]
pub struct CycleEvent {
    pub timestamp: String,
    pub cycle: u64,
    pub trigger: CycleTrigger,
    pub order_ids: Vec<OrderId>,
    pub report: AcceptanceReport,
}

/// Totals printed when the bot shuts down.
#[derive(Debug, Clone, Serialize)]
pub struct ExitSummary {
    pub started_at: String,
    pub stopped_at: String,
    pub cycles: u64,
    pub sweeps: u64,
    pub messages_seen: usize,
    pub orders_extracted: u64,
    pub extraction_failures: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub accepted_ids: Vec<String>,
}
