//! Probe: list the marketplace's available orders without claiming any.
//!
//! Prints each card's parsed identifier, title, whether an accept control
//! was found, and whether the configured title filters would claim it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use factory_autoaccept::auth::{SessionGuard, StdinPrompt};
use factory_autoaccept::browser::{BrowserOptions, ChromeSurface};
use factory_autoaccept::config::{AppConfig, CONFIG_PATH};
use factory_autoaccept::engine::title_matches;
use factory_autoaccept::executor::{AcceptorSettings, OrderAcceptor};
use factory_autoaccept::surface::Navigate;

#[derive(Parser)]
#[command(name = "probe_orders", about = "List available marketplace orders")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[arg(long)]
    show_browser: bool,
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
    dotenvy::dotenv().ok();
    let mut config = AppConfig::load(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok());
    if args.show_browser {
        config.settings.headless = false;
    }

    let surface = ChromeSurface::launch(&BrowserOptions::from_config(&config)).await?;
    let result = probe(&surface, &config).await;
    surface.shutdown().await;
    result
}

async fn probe(surface: &ChromeSurface, config: &AppConfig) -> Result<()> {
    let site = config.marketplace_site();
    // cookies only stick once a page of the site is open
    surface.navigate(&site.home_url).await?;
    if let Err(e) = surface.restore_cookies(&config.marketplace.cookie_file).await {
        eprintln!("Failed to restore cookies: {e}");
    }
    let guard = SessionGuard::new(surface, config.settings.page_settle(), config.settings.max_login_prompts);
    guard.ensure_login(&site, &StdinPrompt).await?;

    let acceptor = OrderAcceptor::new(
        surface,
        AcceptorSettings::from_config(config),
        config.selectors.clone(),
    );

    println!("=== Probe: available orders ===");
    let cards = acceptor.scan_cards().await?;
    println!("Cards: {}", cards.len());
    println!();

    for (idx, card) in cards.iter().enumerate() {
        let title = card.title.as_deref().unwrap_or("<no title>");
        let claim = title_matches(title, &config.marketplace.title_filters);
        println!(
            "{:>3}. id={:<12} accept_control={:<5} title_filter={:<5} \"{}\"",
            idx + 1,
            card.identifier.as_deref().unwrap_or("-"),
            card.accept.is_some(),
            claim,
            title,
        );
    }
    Ok(())
}
