//! Probe: read one chat channel without claiming anything.
//!
//! Validates the chat session, opens the channel and prints, for every
//! visible broadcast, the keyword match result and the extracted order id.
//! Useful to check channel names, selectors and keyword lists.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use factory_autoaccept::auth::{SessionGuard, StdinPrompt};
use factory_autoaccept::browser::{BrowserOptions, ChromeSurface};
use factory_autoaccept::collector::{CollectorSettings, MessageCollector};
use factory_autoaccept::config::{AppConfig, CONFIG_PATH};
use factory_autoaccept::engine::{KeywordSet, extract_order_id, match_message};
use factory_autoaccept::reporter;
use factory_autoaccept::types::MatchPolicy;

#[derive(Parser)]
#[command(name = "probe_channel", about = "Print keyword matches for one chat channel")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Channel to read; defaults to the first configured channel
    #[arg(long)]
    channel: Option<String>,

    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,

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
    let policy = args.policy.unwrap_or(config.keywords.policy);
    let channel = match args.channel.or_else(|| config.chat.channels.first().cloned()) {
        Some(channel) => channel,
        None => anyhow::bail!("no channel given and none configured"),
    };
    let keywords = KeywordSet::new(&config.resolve_keywords()?);

    println!("=== Probe: channel '{channel}' ===");
    println!("Keywords: {} ({policy:?} policy)", keywords.len());
    println!();

    let surface = ChromeSurface::launch(&BrowserOptions::from_config(&config)).await?;
    let result = probe(&surface, &config, &channel, &keywords, policy).await;
    surface.shutdown().await;
    result
}

async fn probe(
    surface: &ChromeSurface,
    config: &AppConfig,
    channel: &str,
    keywords: &KeywordSet,
    policy: MatchPolicy,
) -> Result<()> {
    let guard = SessionGuard::new(surface, config.settings.page_settle(), 0);
    guard.ensure_login(&config.chat_site(), &StdinPrompt).await?;

    let collector = MessageCollector::new(
        surface,
        CollectorSettings::from_config(config),
        config.selectors.clone(),
    );
    collector.load_server().await?;
    let messages = collector.collect_messages(channel).await?;
    println!("Broadcast messages: {}", messages.len());

    for message in &messages {
        let result = match_message(&message.normalized, keywords, policy);
        reporter::report_match(&result);
        if result.matched {
            match extract_order_id(&message.text) {
                Ok(id) => println!("  -> order id: {id}"),
                Err(e) => println!("  -> not actionable: {e}"),
            }
        }
    }
    Ok(())
}
