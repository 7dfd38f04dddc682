use super::display::ConsoleDisplay;
use crate::core::config::AppConfig;
use crate::core::orchestrator::{CycleTrigger, Orchestrator, trigger_channel};
use crate::core::source::BalanceSource;
use crate::export::ExportEngine;
use crate::providers::{
    BinancePriceFeed, CoinGeckoSource, DirectusClient, ExchangeRateProvider, HoldingsSource,
    MANUAL_SOURCE, demo,
};
use anyhow::Result;
use console::{Key, Term};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Refresh,
    Quit,
}

fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Char(' ') => Some(KeyAction::Refresh),
        Key::Enter => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Wires the configured sources and sinks into an orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let tracking = &config.tracking;
    let feed = BinancePriceFeed::new(&config.binance)?;

    let primary: Arc<dyn BalanceSource> = if tracking.demo_mode {
        info!("Demo mode: tracking a generated portfolio");
        let holdings = demo::demo_holdings(&mut rand::thread_rng());
        Arc::new(HoldingsSource::new(
            demo::SOURCE_NAME,
            feed,
            holdings,
            &config.binance.excluded_symbols,
        ))
    } else {
        if config.manual_balances.is_empty() {
            warn!("No manual balances configured");
        }
        Arc::new(HoldingsSource::new(
            MANUAL_SOURCE,
            feed,
            config.manual_balances.clone(),
            &config.binance.excluded_symbols,
        ))
    };

    let rate_source = Arc::new(ExchangeRateProvider::new(config.exchange_rate.clone())?);
    let display = Arc::new(ConsoleDisplay::new(
        config.exchange_rate.currency.as_str(),
        tracking.reference_asset.as_str(),
    ));

    let mut orchestrator = Orchestrator::new(primary, rate_source, display)
        .with_reference_asset(tracking.reference_asset.as_str())
        .with_retry_policy(tracking.retry_policy());

    if !tracking.demo_mode {
        if let Some(coingecko) = config.coingecko.as_ref().filter(|c| !c.assets.is_empty()) {
            orchestrator = orchestrator.with_secondary(Arc::new(CoinGeckoSource::new(coingecko.clone())?));
        }
        if let Some(directus) = config.active_directus() {
            orchestrator = orchestrator.with_telemetry(Arc::new(DirectusClient::new(directus.clone())?));
        }
    }

    if config.export.enabled {
        orchestrator = orchestrator.with_exporter(Arc::new(ExportEngine::new(config.export.clone())));
    }

    Ok(orchestrator)
}

/// Runs the polling loop until Ctrl-C or Enter.
pub async fn watch(config: &AppConfig) -> Result<()> {
    let orchestrator = Arc::new(build_orchestrator(config)?);
    let (trigger, triggers) = trigger_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            ctrl_c_shutdown.send_replace(true);
        }
    });

    if Term::stdout().is_term() {
        spawn_key_listener(trigger, shutdown_tx);
    } else {
        debug!("Not attached to a terminal, keyboard control disabled");
    }

    orchestrator
        .run(config.tracking.update_interval(), triggers, shutdown_rx)
        .await;
    Ok(())
}

/// Reads keys on a plain thread: `read_key` blocks and cannot be cancelled,
/// and a detached thread does not hold up runtime shutdown.
fn spawn_key_listener(trigger: CycleTrigger, shutdown: watch::Sender<bool>) {
    std::thread::spawn(move || {
        let term = Term::stdout();
        while !*shutdown.borrow() {
            match term.read_key() {
                Ok(key) => match key_action(&key) {
                    Some(KeyAction::Refresh) => {
                        if !trigger.fire() {
                            debug!("Refresh already pending");
                        }
                    }
                    Some(KeyAction::Quit) => {
                        info!("Quit requested");
                        shutdown.send_replace(true);
                    }
                    None => {}
                },
                Err(e) => {
                    debug!("Keyboard listener stopped: {e}");
                    break;
                }
            }
        }
    });
}
