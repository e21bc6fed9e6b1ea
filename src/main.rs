//! # Lightwatch — outage schedule notifications
//!
//! Watches the published power-outage schedule and tells every subscriber,
//! over Telegram, when their groups' schedule changes and shortly before
//! each outage starts or ends.
//!
//! Usage:
//!   lightwatch                              # Run the notifier (same as `run`)
//!   lightwatch run --dry-run                # Copy subscribers into memory, log messages instead of sending
//!   lightwatch subscribe 123456789 1 4      # Follow groups 1 and 4
//!   lightwatch unsubscribe 123456789        # Forget a subscriber
//!   lightwatch check-config                 # Validate and print the effective config

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use lightwatch_channels::TelegramMessenger;
use lightwatch_core::clock::{Clock, SystemClock};
use lightwatch_core::config::LightwatchConfig;
use lightwatch_core::schedule::GroupNumber;
use lightwatch_core::subscription::{SubscriberId, Subscription};
use lightwatch_core::traits::{Messenger, Store};
use lightwatch_scheduler::engine::run_guarded;
use lightwatch_scheduler::{
    ActiveHours, AdvanceNotifier, AlertWindow, ChangeNotifier, CleanupJob, MemoryStore,
    RefreshJob, Scheduler, SqliteStore,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lightwatch",
    version,
    about = "💡 Lightwatch — outage schedule change and advance-notice notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: ~/.lightwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic jobs until Ctrl-C
    Run {
        /// Work on an in-memory copy of the subscribers and log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Create or replace a subscription
    Subscribe {
        /// Telegram chat id
        subscriber: SubscriberId,
        /// Outage group numbers to follow
        #[arg(required = true, num_args = 1..)]
        groups: Vec<GroupNumber>,
    },
    /// Remove a subscriber and everything stored about them
    Unsubscribe { subscriber: SubscriberId },
    /// Validate the configuration and print it
    CheckConfig,
}

/// Dry-run messenger: writes every message to the log.
struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_message(
        &self,
        recipient: SubscriberId,
        text: &str,
    ) -> lightwatch_core::error::Result<()> {
        tracing::info!(recipient, "✉️ (dry run)\n{text}");
        Ok(())
    }
}

fn load_config(path: Option<&str>) -> Result<LightwatchConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).to_string());
            LightwatchConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => LightwatchConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &LightwatchConfig) -> Result<SqliteStore> {
    let path = config.store.resolved_path();
    let store =
        SqliteStore::open(&path).with_context(|| format!("opening store {}", path.display()))?;
    tracing::info!("🗄️ Store: {}", path.display());
    Ok(store)
}

/// In-memory store seeded with the subscribers of the configured database.
fn dry_run_store(config: &LightwatchConfig) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    let path = config.store.resolved_path();
    if path.exists() {
        let copied = store.copy_subscriptions_from(&open_store(config)?)?;
        tracing::info!("👥 Dry run with {copied} subscribers from {}", path.display());
    } else {
        tracing::warn!("⚠️ No store at {}, dry run has no subscribers", path.display());
    }
    Ok(store)
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "lightwatch=debug,lightwatch_core=debug,lightwatch_scheduler=debug,lightwatch_channels=debug,lightwatch_providers=debug"
    } else {
        "lightwatch=info,lightwatch_core=info,lightwatch_scheduler=info,lightwatch_channels=info,lightwatch_providers=info"
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Run { dry_run } => run(config, dry_run).await,
        Command::Subscribe { subscriber, groups } => {
            let store = open_store(&config)?;
            let subscription = match store.get_subscription(subscriber)? {
                Some(mut existing) => {
                    existing.groups = groups.into_iter().collect();
                    existing
                }
                None => Subscription::new(subscriber, groups, SystemClock.now()),
            };
            store.put_subscription(&subscription)?;
            println!(
                "✅ Subscriber {} follows groups {:?}",
                subscription.subscriber_id, subscription.groups
            );
            Ok(())
        }
        Command::Unsubscribe { subscriber } => {
            let store = open_store(&config)?;
            store.purge_subscriber(subscriber)?;
            println!("🗑️ Subscriber {subscriber} removed");
            Ok(())
        }
        Command::CheckConfig => {
            let mut shown = config.clone();
            if !shown.telegram.bot_token.is_empty() {
                shown.telegram.bot_token = "***".into();
            }
            println!("✅ Configuration is valid\n");
            println!("{}", shown.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: LightwatchConfig, dry_run: bool) -> Result<()> {
    println!("💡 Lightwatch v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (store, messenger): (Arc<dyn Store>, Arc<dyn Messenger>) = if dry_run {
        tracing::warn!("⚠️ Dry run: in-memory store, messages are only logged");
        (Arc::new(dry_run_store(&config)?), Arc::new(LogMessenger))
    } else {
        let telegram = TelegramMessenger::new(&config.telegram)?;
        let bot = telegram
            .get_me()
            .await
            .context("checking the Telegram bot token")?;
        tracing::info!("🤖 Telegram bot: @{}", bot.username.unwrap_or(bot.first_name));
        (Arc::new(open_store(&config)?), Arc::new(telegram))
    };
    let provider = lightwatch_providers::create_provider(&config.provider)?;

    let refresh = Arc::new(RefreshJob::new(provider, store.clone()));
    let changes = Arc::new(ChangeNotifier::new(
        store.clone(),
        messenger.clone(),
        clock.clone(),
    ));
    let advance = Arc::new(AdvanceNotifier::new(
        store.clone(),
        messenger,
        clock.clone(),
        AlertWindow::from_config(&config.alerts),
        ActiveHours::from_config(&config.alerts)?,
    ));
    let cleanup = Arc::new(CleanupJob::new(store, clock, config.retention.clone()));

    // Fill the store before the first notifier tick.
    run_guarded(refresh.as_ref()).await;

    let jobs = &config.jobs;
    let mut scheduler = Scheduler::new(Duration::from_secs(jobs.heartbeat_secs));
    scheduler.register(refresh, Duration::from_secs(jobs.refresh_secs));
    scheduler.register(changes, Duration::from_secs(jobs.changes_secs));
    scheduler.register(advance, Duration::from_secs(jobs.alerts_secs));
    scheduler.register(cleanup, Duration::from_secs(jobs.cleanup_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.start(shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("🛑 Ctrl-C received, shutting down"),
        Err(e) => tracing::error!("Signal handler failed, shutting down: {e}"),
    }
    shutdown_tx.send(true).ok();
    scheduler_task.await.context("scheduler task")?;
    Ok(())
}
