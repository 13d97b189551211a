use thiserror::Error;

use crate::ORDER_ID_MARKER;
use crate::types::{MatchPolicy, MatchResult, OrderId};

/// A keyword phrase split into lower-cased words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub phrase: String,
    pub words: Vec<String>,
}

impl Keyword {
    /// Returns `None` for phrases without any words.
    pub fn parse(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim();
        let words: Vec<String> = phrase.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return None;
        }
        Some(Self {
            phrase: phrase.to_string(),
            words,
        })
    }

    /// Number of words of this phrase occurring as substrings of `message`.
    pub fn words_found(&self, message: &str) -> usize {
        self.words.iter().filter(|w| message.contains(w.as_str())).count()
    }
}

/// Keywords in declaration order, so the first firing phrase is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    pub fn new(phrases: &[String]) -> Self {
        Self {
            keywords: phrases.iter().filter_map(|p| Keyword::parse(p)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }
}

/// Score a normalized message against the keyword set under `policy`.
///
/// The scan stops at the first keyword that fires. When none fires, the
/// reported counts belong to the keyword with the most words found.
pub fn match_message(message: &str, keywords: &KeywordSet, policy: MatchPolicy) -> MatchResult {
    let message_lower = message.to_lowercase();
    let mut best: Option<(&Keyword, usize)> = None;

    for keyword in keywords.iter() {
        let found = keyword.words_found(&message_lower);
        let total = keyword.words.len();

        if policy.fires(found, total) {
            return MatchResult {
                message: message.to_string(),
                matched: true,
                words_found: found,
                words_total: total,
                keyword: Some(keyword.phrase.clone()),
            };
        }

        if best.is_none_or(|(_, best_found)| found > best_found) {
            best = Some((keyword, found));
        }
    }

    let (words_found, words_total, keyword) = match best {
        Some((k, found)) => (found, k.words.len(), Some(k.phrase.clone())),
        None => (0, 0, None),
    };

    MatchResult {
        message: message.to_string(),
        matched: false,
        words_found,
        words_total,
        keyword,
    }
}

/// Why a matched message did not yield an order id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no \"order id: \" marker in message")]
    MarkerMissing,
    #[error("nothing follows the \"order id: \" marker")]
    EmptyIdentifier,
}

/// Extract the order id following the last `order id: ` marker.
///
/// The marker is located case-insensitively; the identifier keeps the casing
/// of `message`.
pub fn extract_order_id(message: &str) -> Result<OrderId, ExtractionError> {
    // ASCII lowering keeps byte offsets aligned with `message`
    let lowered = message.to_ascii_lowercase();
    let start = lowered
        .rfind(ORDER_ID_MARKER)
        .ok_or(ExtractionError::MarkerMissing)?
        + ORDER_ID_MARKER.len();

    message[start..]
        .split_whitespace()
        .next()
        .map(|token| OrderId(token.to_string()))
        .ok_or(ExtractionError::EmptyIdentifier)
}

/// Parse the identifier out of card text like `"Jan 5, 2024 - #XJ991"`.
pub fn parse_card_identifier(text: &str) -> Option<String> {
    let tail = match text.rsplit_once(" - ") {
        Some((_, tail)) => tail,
        None => text,
    };
    let tail = tail.trim();
    let id = tail.strip_prefix('#').unwrap_or(tail).trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Whether a card title equals one of the configured title filters.
pub fn title_matches(title: &str, filters: &[String]) -> bool {
    let title = title.trim().to_lowercase();
    filters.iter().any(|f| f.trim().to_lowercase() == title)
}

/// Whether a message carries the broadcast marker.
pub fn is_broadcast(content: &str, marker: &str) -> bool {
    content.to_lowercase().contains(&marker.to_lowercase())
}
