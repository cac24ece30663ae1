use std::sync::Arc;

use anyhow::Context;
use teloxide::Bot;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ptb_belpost::BelpostClient;
use ptb_core::{
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    store::SqliteTrackStore,
    tracker::Tracker,
};
use ptb_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ptb_core::logging::init("ptb")?;

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(
        SqliteTrackStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("failed to open database {}", cfg.database_url))?,
    );
    let carrier = Arc::new(BelpostClient::new(
        cfg.carrier_api_url.clone(),
        cfg.carrier_timeout,
    )?);

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    // Throttle outbound sends so a scan fanning out notices stays under Telegram limits.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let tracker = Arc::new(Tracker::new(&cfg, store, carrier, messenger));

    let shutdown = CancellationToken::new();
    let scanner = tokio::spawn(scan_ticker(
        tracker.clone(),
        cfg.clone(),
        shutdown.clone(),
    ));

    let polled = ptb_telegram::router::run_polling(bot, tracker).await;

    shutdown.cancel();
    if let Err(e) = scanner.await {
        tracing::error!(error = %e, "scan task panicked");
    }

    polled.context("telegram bot failed")
}

/// Run a scan every `scan_interval` until `shutdown` fires. Cycles never overlap.
async fn scan_ticker(tracker: Arc<Tracker>, cfg: Arc<Config>, shutdown: CancellationToken) {
    let mut ticker = interval(cfg.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = tracker.scan().await;
                tracing::info!(
                    refreshed = report.refreshed,
                    failed = report.failed,
                    notified = report.notified,
                    pruned = report.pruned,
                    prune_failed = report.prune_failed,
                    "scan cycle finished"
                );
            }
        }
    }
}
