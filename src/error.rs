use thiserror::Error;

/// Failures raised by the reconciliation loop and the browser surface.
#[derive(Debug, Error)]
pub enum BotError {
    /// Navigating to a site's home landed on its login page.
    #[error("{site} session expired (landed on {url})")]
    SessionExpired { site: String, url: String },

    /// The channel control never became clickable; the configured name is wrong.
    #[error("channel '{channel}' not found after {attempts} attempt(s)")]
    ChannelNotFound { channel: String, attempts: u32 },

    /// The marketplace listing page could not be loaded at all.
    #[error("order listing unavailable: {0}")]
    ListingUnavailable(String),

    /// Element lookup, click, navigation or script execution failed.
    #[error("surface interaction failed on `{selector}`: {reason}")]
    Surface { selector: String, reason: String },
}

impl BotError {
    pub fn surface(selector: impl Into<String>, reason: impl ToString) -> Self {
        Self::Surface {
            selector: selector.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors stop the process; everything else restarts the cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::SessionExpired { .. } | BotError::ChannelNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        let expired = BotError::SessionExpired {
            site: "chat".into(),
            url: "https://discord.com/login".into(),
        };
        let missing = BotError::ChannelNotFound {
            channel: "orders".into(),
            attempts: 5,
        };
        assert!(expired.is_fatal());
        assert!(missing.is_fatal());
        assert!(!BotError::surface("h3", "not found").is_fatal());
        assert!(!BotError::ListingUnavailable("timeout".into()).is_fatal());
    }

    #[test]
    fn surface_error_names_selector() {
        let err = BotError::surface("button.order-accept-btn", "node detached");
        assert_eq!(
            err.to_string(),
            "surface interaction failed on `button.order-accept-btn`: node detached"
        );
    }
}
