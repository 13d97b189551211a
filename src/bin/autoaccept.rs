use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use factory_autoaccept::auth::{OperatorPrompt, SessionGuard, StdinPrompt, login_with_credentials};
use factory_autoaccept::browser::{BrowserOptions, ChromeSurface};
use factory_autoaccept::collector::{CollectorSettings, MessageCollector};
use factory_autoaccept::config::{AppConfig, CONFIG_PATH, SiteConfig};
use factory_autoaccept::engine::KeywordSet;
use factory_autoaccept::error::BotError;
use factory_autoaccept::executor::{AcceptorSettings, OrderAcceptor};
use factory_autoaccept::poller::PollingLoop;
use factory_autoaccept::reporter;
use factory_autoaccept::state::{PendingOrders, RunStats};
use factory_autoaccept::surface::Navigate;
use factory_autoaccept::types::{CycleEvent, CycleTrigger, MatchPolicy};

#[derive(Parser)]
#[command(name = "autoaccept", about = "Accept marketplace orders announced in chat")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Show the browser window (overrides settings.headless)
    #[arg(long)]
    show_browser: bool,

    /// Keyword match policy (overrides keywords.policy)
    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,

    /// Channel to watch; repeat to watch several (overrides chat.channels)
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Skip chat polling and accept by title filter on a fixed interval
    #[arg(long)]
    factory_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded .env overrides");
    }
    let mut config = AppConfig::load(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok());
    info!("Loaded config from {}", args.config.display());

    if args.show_browser {
        config.settings.headless = false;
    }
    if let Some(policy) = args.policy {
        config.keywords.policy = policy;
    }
    if !args.channels.is_empty() {
        config.chat.channels = args.channels.clone();
    }
    config.validate(!args.factory_only)?;

    let phrases = config.resolve_keywords()?;
    let keywords = KeywordSet::new(&phrases);
    if !args.factory_only && keywords.is_empty() {
        bail!("No keywords configured: set keywords.phrases, keywords.file or KEYWORDS");
    }
    if args.factory_only && config.marketplace.title_filters.is_empty() {
        bail!("--factory-only needs marketplace.title_filters");
    }
    if config.keywords.policy == MatchPolicy::Lenient {
        for keyword in keywords.iter().filter(|k| k.words.len() == 1) {
            warn!(
                "Keyword \"{}\" has a single word and matches every message under the lenient policy",
                keyword.phrase
            );
        }
    }

    let mode = if args.factory_only { "factory-only" } else { "chat" };
    info!(
        "Starting autoaccept ({mode}): channels={:?} keywords={} policy={:?} headless={}",
        config.chat.channels,
        keywords.len(),
        config.keywords.policy,
        config.settings.headless,
    );

    let surface = ChromeSurface::launch(&BrowserOptions::from_config(&config)).await?;
    let result = run(&surface, &config, keywords, args.factory_only).await;
    surface.shutdown().await;
    result
}

async fn run(
    surface: &ChromeSurface,
    config: &AppConfig,
    keywords: KeywordSet,
    factory_only: bool,
) -> Result<()> {
    let prompt = StdinPrompt;
    let settings = &config.settings;
    let guard = SessionGuard::new(surface, settings.page_settle(), settings.max_login_prompts);
    let market_site = config.marketplace_site();
    let chat_site = config.chat_site();

    if !factory_only {
        restore_cookies(surface, &chat_site, &config.chat.cookie_file).await;
        guard.ensure_login(&chat_site, &prompt).await?;
        save_cookies(surface, &config.chat.cookie_file).await;
    }
    establish_marketplace_session(surface, config, &guard, &prompt).await?;

    let acceptor = OrderAcceptor::new(
        surface,
        AcceptorSettings::from_config(config),
        config.selectors.clone(),
    );
    let mut poller = PollingLoop::new(
        SessionGuard::new(surface, settings.page_settle(), settings.max_login_prompts),
        MessageCollector::new(
            surface,
            CollectorSettings::from_config(config),
            config.selectors.clone(),
        ),
        chat_site,
        config.chat.channels.clone(),
        keywords,
        config.keywords.policy,
    );
    let mut stats = RunStats::new();

    info!("Entering polling loop. Press Ctrl+C to stop.");

    let outcome = loop {
        let cycle = async {
            if factory_only {
                let result = listing_cycle(&guard, &acceptor, &market_site, &prompt, &mut stats).await;
                if result.is_ok() {
                    info!("Waiting {:?} before the next scan", settings.poll_interval());
                    surface.wait_settle(settings.poll_interval()).await;
                }
                result
            } else {
                chat_cycle(&mut poller, &guard, &acceptor, &market_site, &prompt, &mut stats).await
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break Ok(());
            }
            result = cycle => {
                match result {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        error!("Fatal: {e}");
                        break Err(e);
                    }
                    Err(e) => warn!("Cycle error: {e}"),
                }
            }
        }
    };

    // Keep the marketplace session for the next run
    save_cookies(surface, &config.marketplace.cookie_file).await;

    stats.sweeps = poller.sweeps();
    stats.orders_extracted = poller.orders_extracted();
    stats.extraction_failures = poller.extraction_failures();
    reporter::report_exit_summary(&stats.exit_summary(poller.seen().len()));

    outcome.map_err(Into::into)
}

/// Wait for announced orders, then claim them on the marketplace.
async fn chat_cycle(
    poller: &mut PollingLoop<'_, ChromeSurface>,
    guard: &SessionGuard<'_, ChromeSurface>,
    acceptor: &OrderAcceptor<'_, ChromeSurface>,
    market_site: &SiteConfig,
    prompt: &dyn OperatorPrompt,
    stats: &mut RunStats,
) -> Result<(), BotError> {
    let pending = poller.poll_until_new_orders(prompt).await?;
    let result = match guard.ensure_login(market_site, prompt).await {
        Ok(()) => acceptor.accept_orders(&pending).await,
        Err(e) => Err(e),
    };
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            // nothing was claimed; retry these ids next cycle
            poller.requeue(pending);
            return Err(e);
        }
    };
    stats.record_acceptance(&report);

    reporter::report_event(&CycleEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        cycle: stats.cycles,
        trigger: CycleTrigger::OrdersAnnounced,
        order_ids: pending.ids().to_vec(),
        report,
    });
    Ok(())
}

/// Scan the listing and claim cards by title filter only.
async fn listing_cycle(
    guard: &SessionGuard<'_, ChromeSurface>,
    acceptor: &OrderAcceptor<'_, ChromeSurface>,
    market_site: &SiteConfig,
    prompt: &dyn OperatorPrompt,
    stats: &mut RunStats,
) -> Result<(), BotError> {
    guard.ensure_login(market_site, prompt).await?;
    let report = acceptor.accept_orders(&PendingOrders::new()).await?;
    stats.record_acceptance(&report);

    reporter::report_event(&CycleEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        cycle: stats.cycles,
        trigger: CycleTrigger::ListingScan,
        order_ids: Vec::new(),
        report,
    });
    Ok(())
}

/// Restore cookies, fall back to credentials, then to the session policy.
async fn establish_marketplace_session(
    surface: &ChromeSurface,
    config: &AppConfig,
    guard: &SessionGuard<'_, ChromeSurface>,
    prompt: &dyn OperatorPrompt,
) -> Result<()> {
    let site = config.marketplace_site();
    restore_cookies(surface, &site, &config.marketplace.cookie_file).await;

    match guard.validate_login(&site).await {
        Ok(()) => return Ok(()),
        Err(BotError::SessionExpired { .. }) => {
            info!("Marketplace session not active");
        }
        Err(e) => return Err(e.into()),
    }

    if config.account.is_complete() {
        login_with_credentials(
            surface,
            &config.marketplace.login_url,
            &config.account,
            &config.selectors,
            config.settings.page_settle(),
        )
        .await?;
    } else {
        warn!("No marketplace credentials configured; manual login required");
    }

    guard.ensure_login(&site, prompt).await?;
    save_cookies(surface, &config.marketplace.cookie_file).await;
    Ok(())
}

/// Cookies can only be set for the site's domain once a page of it is open.
async fn restore_cookies(surface: &ChromeSurface, site: &SiteConfig, path: &std::path::Path) {
    if let Err(e) = surface.navigate(&site.home_url).await {
        warn!("Failed to open {} before restoring cookies: {e}", site.name);
        return;
    }
    match surface.restore_cookies(path).await {
        Ok(Some(_)) => {}
        Ok(None) => info!("No {} cookies at {}", site.name, path.display()),
        Err(e) => warn!("Failed to restore {} cookies: {e}", site.name),
    }
}

async fn save_cookies(surface: &ChromeSurface, path: &std::path::Path) {
    match surface.save_cookies(path).await {
        Ok(count) => info!("Saved {count} cookie(s) to {}", path.display()),
        Err(e) => warn!("Failed to save cookies to {}: {e}", path.display()),
    }
}
