//! setup-account: first-time setup for the order autoaccept bot.
//!
//! Expects `config.toml` to already exist (copied from `config.toml.template`).
//! Opens a visible browser, logs in to the marketplace with the given
//! credentials, waits for a manual chat login, stores both cookie artifacts,
//! and saves the credentials in the config file.
//!
//! By default, reads the password interactively (hidden input) to avoid
//! leaking it into shell history. Use `--password` only for scripted/CI use.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use factory_autoaccept::auth::{SessionGuard, StdinPrompt, login_with_credentials};
use factory_autoaccept::browser::{BrowserOptions, ChromeSurface};
use factory_autoaccept::config::{AppConfig, CONFIG_PATH};
use factory_autoaccept::types::SessionPolicy;

#[derive(Parser)]
#[command(
    name = "setup-account",
    about = "Log in to both sites, store session cookies and save credentials to config.toml"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Marketplace username. If omitted, read interactively.
    #[arg(long)]
    username: Option<String>,

    /// Marketplace password. If omitted, read interactively with hidden input (recommended).
    #[arg(long)]
    password: Option<String>,

    /// Skip the chat login step
    #[arg(long)]
    skip_chat: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load existing config
    let mut app_config = AppConfig::load(&cli.config).with_context(|| {
        format!(
            "{} not found: copy config.toml.template to config.toml first",
            cli.config.display()
        )
    })?;

    println!("=== Order Autoaccept: Account Setup ===\n");

    // ── Step 1: Read credentials ───────────────────────────────────
    let username = match cli.username {
        Some(name) => name,
        None => {
            print!("Marketplace username: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("failed to read username")?;
            line.trim().to_string()
        }
    };
    if username.is_empty() {
        bail!("username cannot be empty");
    }

    let password = match cli.password {
        Some(password) => password,
        None => rpassword::prompt_password("Marketplace password: ")
            .context("failed to read password")?,
    };
    if password.is_empty() {
        bail!("password cannot be empty");
    }
    app_config.account.username = username;
    app_config.account.password = password;

    // ── Step 2: Launch a visible browser ───────────────────────────
    println!("Launching browser...");
    let mut options = BrowserOptions::from_config(&app_config);
    options.headless = false;
    let surface = ChromeSurface::launch(&options).await?;
    let result = login_both(&surface, &app_config, cli.skip_chat).await;
    surface.shutdown().await;
    result?;

    // ── Step 3: Save credentials to config.toml ────────────────────
    println!("Updating credentials in {}...", cli.config.display());
    app_config.save(&cli.config)?;
    println!("  Config updated successfully");
    println!();

    // ── Summary ────────────────────────────────────────────────────
    println!("=== Setup Complete ===");
    println!();
    println!("Sessions:");
    println!("  Marketplace cookies: {}", app_config.marketplace.cookie_file.display());
    if !cli.skip_chat {
        println!("  Chat cookies:        {}", app_config.chat.cookie_file.display());
    }
    println!();
    println!("Next steps:");
    println!("  cargo run --bin probe_channel -- --channel <name>");
    println!("  cargo run --bin autoaccept");

    Ok(())
}

async fn login_both(surface: &ChromeSurface, config: &AppConfig, skip_chat: bool) -> Result<()> {
    let settings = &config.settings;
    // the operator is at the keyboard, so allow at least one prompt
    let guard = SessionGuard::new(surface, settings.page_settle(), settings.max_login_prompts.max(1));
    let mut site = config.marketplace_site();

    println!("Logging in to the marketplace...");
    login_with_credentials(
        surface,
        &config.marketplace.login_url,
        &config.account,
        &config.selectors,
        settings.page_settle(),
    )
    .await?;
    site.policy = SessionPolicy::Prompt;
    guard
        .ensure_login(&site, &StdinPrompt)
        .await
        .context("marketplace login failed, check your credentials")?;
    let count = surface.save_cookies(&config.marketplace.cookie_file).await?;
    println!("  Logged in; saved {count} cookie(s)");
    println!();

    if skip_chat {
        return Ok(());
    }

    println!("Opening the chat server...");
    let mut chat = config.chat_site();
    chat.policy = SessionPolicy::Prompt;
    guard
        .ensure_login(&chat, &StdinPrompt)
        .await
        .context("chat login was not completed")?;
    let count = surface.save_cookies(&config.chat.cookie_file).await?;
    println!("  Logged in; saved {count} cookie(s)");
    println!();
    Ok(())
}
