use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::{AccountConfig, Selectors, SiteConfig};
use crate::error::BotError;
use crate::surface::{Interact, Navigate};
use crate::types::SessionPolicy;

/// Asks the operator to finish a manual login in the browser window.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn wait_for_login(&self, site: &str) -> Result<(), BotError>;
}

/// Prompts on stdout and waits for Enter on stdin.
pub struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn wait_for_login(&self, site: &str) -> Result<(), BotError> {
        println!("You need to log in to the {site} in the browser window.");
        println!("Press Enter once you are logged in...");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| BotError::surface("stdin", e))?;
        Ok(())
    }
}

/// Checks login state by navigating home and looking at where the page lands.
///
/// Nothing is cached: sessions expire without notice, so every call
/// re-derives the state from the current URL.
pub struct SessionGuard<'a, N: Navigate> {
    surface: &'a N,
    settle: Duration,
    max_prompts: u32,
}

impl<'a, N: Navigate> SessionGuard<'a, N> {
    pub fn new(surface: &'a N, settle: Duration, max_prompts: u32) -> Self {
        Self {
            surface,
            settle,
            max_prompts,
        }
    }

    /// Navigate to the site's home and fail if it redirected to the login page.
    pub async fn validate_login(&self, site: &SiteConfig) -> Result<(), BotError> {
        info!("Validating {} login...", site.name);
        self.surface.navigate(&site.home_url).await?;
        self.surface.wait_settle(self.settle).await;
        self.check_current(site).await
    }

    /// Judge the page already loaded for `site` without navigating.
    pub async fn check_current(&self, site: &SiteConfig) -> Result<(), BotError> {
        let url = self.surface.current_url().await?;
        if url.contains(&site.login_marker) {
            return Err(BotError::SessionExpired {
                site: site.name.clone(),
                url,
            });
        }
        info!("Logged in to {}", site.name);
        Ok(())
    }

    /// Validate, applying the site's session policy on expiry.
    pub async fn ensure_login(
        &self,
        site: &SiteConfig,
        prompt: &dyn OperatorPrompt,
    ) -> Result<(), BotError> {
        let mut prompts = 0;
        loop {
            match self.validate_login(site).await {
                Ok(()) => return Ok(()),
                Err(err @ BotError::SessionExpired { .. }) => {
                    if site.policy == SessionPolicy::Stop || prompts >= self.max_prompts {
                        return Err(err);
                    }
                    prompts += 1;
                    warn!(
                        "{} session expired (prompt {prompts}/{})",
                        site.name, self.max_prompts
                    );
                    prompt.wait_for_login(&site.name).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Fill and submit the marketplace login form.
pub async fn login_with_credentials<S: Interact>(
    surface: &S,
    login_url: &str,
    account: &AccountConfig,
    selectors: &Selectors,
    settle: Duration,
) -> Result<(), BotError> {
    info!("Logging in to the marketplace as {}", account.username);
    surface.navigate(login_url).await?;
    surface.wait_settle(settle).await;

    let username = surface.query_single(&selectors.login_username).await?;
    surface.type_text(&username, &account.username).await?;

    let password = surface.query_single(&selectors.login_password).await?;
    surface.type_text(&password, &account.password).await?;

    let submit = surface.query_single(&selectors.login_submit).await?;
    surface.click_via_script(&submit).await?;
    surface.wait_settle(settle).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::surface::fake::FakeSurface;

    const HOME: &str = "https://discord.com/channels/123";

    fn site(policy: SessionPolicy) -> SiteConfig {
        SiteConfig {
            name: "chat".into(),
            home_url: HOME.into(),
            login_marker: "/login".into(),
            policy,
        }
    }

    /// Counts prompts; clears the login redirect after `fix_after` prompts.
    struct CountingPrompt<'a> {
        surface: &'a FakeSurface,
        count: AtomicU32,
        fix_after: u32,
    }

    #[async_trait]
    impl OperatorPrompt for CountingPrompt<'_> {
        async fn wait_for_login(&self, _site: &str) -> Result<(), BotError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.fix_after {
                self.surface.clear_redirects();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn logged_in_session_validates() {
        let surface = FakeSurface::new();
        let guard = SessionGuard::new(&surface, Duration::ZERO, 3);
        guard.validate_login(&site(SessionPolicy::Stop)).await.unwrap();
        assert_eq!(surface.navigations(), vec![HOME.to_string()]);
    }

    #[tokio::test]
    async fn login_redirect_is_session_expired() {
        let surface = FakeSurface::new();
        surface.redirect(HOME, "https://discord.com/login?redirect_to=%2Fchannels");
        let guard = SessionGuard::new(&surface, Duration::ZERO, 3);

        // repeated checks re-derive the state each time
        for _ in 0..2 {
            let err = guard.validate_login(&site(SessionPolicy::Stop)).await.unwrap_err();
            assert!(matches!(err, BotError::SessionExpired { .. }));
        }
        assert_eq!(surface.navigations().len(), 2);
    }

    #[tokio::test]
    async fn current_page_check_does_not_navigate() {
        let surface = FakeSurface::new();
        surface.redirect(HOME, "https://discord.com/login");
        surface.navigate(HOME).await.unwrap();
        let guard = SessionGuard::new(&surface, Duration::ZERO, 3);

        let err = guard.check_current(&site(SessionPolicy::Stop)).await.unwrap_err();
        assert!(matches!(err, BotError::SessionExpired { .. }));
        assert_eq!(surface.navigations().len(), 1);
    }

    #[tokio::test]
    async fn stop_policy_never_prompts() {
        let surface = FakeSurface::new();
        surface.redirect(HOME, "https://discord.com/login");
        let prompt = CountingPrompt {
            surface: &surface,
            count: AtomicU32::new(0),
            fix_after: 1,
        };
        let guard = SessionGuard::new(&surface, Duration::ZERO, 3);
        let err = guard
            .ensure_login(&site(SessionPolicy::Stop), &prompt)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(prompt.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_policy_retries_after_manual_login() {
        let surface = FakeSurface::new();
        surface.redirect(HOME, "https://discord.com/login");
        let prompt = CountingPrompt {
            surface: &surface,
            count: AtomicU32::new(0),
            fix_after: 2,
        };
        let guard = SessionGuard::new(&surface, Duration::ZERO, 3);
        guard
            .ensure_login(&site(SessionPolicy::Prompt), &prompt)
            .await
            .unwrap();
        assert_eq!(prompt.count.load(Ordering::SeqCst), 2);
        assert_eq!(surface.navigations().len(), 3);
    }

    #[tokio::test]
    async fn prompt_policy_is_bounded() {
        let surface = FakeSurface::new();
        surface.redirect(HOME, "https://discord.com/login");
        let prompt = CountingPrompt {
            surface: &surface,
            count: AtomicU32::new(0),
            fix_after: u32::MAX,
        };
        let guard = SessionGuard::new(&surface, Duration::ZERO, 2);
        let err = guard
            .ensure_login(&site(SessionPolicy::Prompt), &prompt)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::SessionExpired { .. }));
        assert_eq!(prompt.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn credential_login_fills_form() {
        let surface = FakeSurface::new();
        let selectors = Selectors::default();
        surface.add_element(&selectors.login_username, "username", "");
        surface.add_element(&selectors.login_password, "password", "");
        surface.add_element(&selectors.login_submit, "submit", "Log in");
        let account = AccountConfig {
            username: "booster".into(),
            password: "hunter2".into(),
        };

        login_with_credentials(
            &surface,
            "https://www.boostingfactory.com/login",
            &account,
            &selectors,
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(
            surface.typed(),
            vec![
                ("username".to_string(), "booster".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]
        );
        assert_eq!(surface.clicks(), vec!["submit".to_string()]);
    }

    #[tokio::test]
    async fn credential_login_reports_missing_field() {
        let surface = FakeSurface::new();
        let account = AccountConfig {
            username: "booster".into(),
            password: "hunter2".into(),
        };
        let err = login_with_credentials(
            &surface,
            "https://www.boostingfactory.com/login",
            &account,
            &Selectors::default(),
            Duration::ZERO,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BotError::Surface { ref selector, .. } if selector == "input#uName"));
    }
}
