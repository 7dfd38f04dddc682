//! Polling loop that turns timer ticks and manual refreshes into balance
//! cycles: fetch from every source, aggregate, then fan out to the display,
//! the exporter and the telemetry sink.

use crate::core::balance::Balance;
use crate::core::record::Snapshot;
use crate::core::retry::{RetryPolicy, with_retry};
use crate::core::sink::{DisplaySink, SnapshotExporter, TelemetrySink};
use crate::core::source::{BalanceSource, RateSource};
use anyhow::{Context, Result};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Aggregating,
    Dispatching,
    Stopped,
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { balances: usize },
    /// The primary source exhausted its retries; nothing was dispatched.
    PrimaryUnavailable,
    /// Every source came back empty; nothing was dispatched.
    Empty,
    /// An unexpected error ended the cycle early.
    Failed,
}

/// Handle for requesting an immediate refresh.
#[derive(Debug, Clone)]
pub struct CycleTrigger {
    tx: mpsc::Sender<()>,
}

impl CycleTrigger {
    /// Returns `false` when a refresh is already pending; the request is dropped.
    pub fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Depth-1 trigger queue: a second request while one is pending is dropped.
pub fn trigger_channel() -> (CycleTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (CycleTrigger { tx }, rx)
}

pub struct Orchestrator {
    primary: Arc<dyn BalanceSource>,
    secondaries: Vec<Arc<dyn BalanceSource>>,
    rate_source: Arc<dyn RateSource>,
    display: Arc<dyn DisplaySink>,
    exporter: Option<Arc<dyn SnapshotExporter>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    reference_asset: String,
    retry_policy: RetryPolicy,
    state: watch::Sender<CycleState>,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn BalanceSource>,
        rate_source: Arc<dyn RateSource>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            primary,
            secondaries: Vec::new(),
            rate_source,
            display,
            exporter: None,
            telemetry: None,
            reference_asset: "BTC".to_string(),
            retry_policy: RetryPolicy::default(),
            state,
        }
    }

    pub fn with_secondary(mut self, source: Arc<dyn BalanceSource>) -> Self {
        self.secondaries.push(source);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn SnapshotExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_reference_asset(mut self, asset: impl Into<String>) -> Self {
        self.reference_asset = asset.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: CycleState) {
        self.state.send_replace(state);
    }

    /// Runs cycles on every `interval` tick (the first one immediately) and on
    /// every manual trigger until `shutdown` flips to `true`.
    ///
    /// Cycles never overlap. Triggers received while a cycle is running are
    /// discarded. A cycle in flight when shutdown is requested runs to
    /// completion before the loop exits.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut triggers: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let started = Instant::now();
        let mut ticker = tokio::time::interval_at(started, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = interval.as_secs(),
            secondaries = self.secondaries.len(),
            "Balance tracking started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown channel closed");
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => debug!("Update timer fired"),
                Some(()) = triggers.recv() => debug!("Manual refresh requested"),
            }

            // The cycle runs on its own task so a panic inside a collaborator
            // is contained and the timer keeps firing.
            let this = Arc::clone(&self);
            match tokio::spawn(async move { this.run_cycle().await }).await {
                Ok(outcome) => debug!(?outcome, "Cycle finished"),
                Err(e) => {
                    error!(error = %e, "Cycle aborted unexpectedly");
                    self.set_state(CycleState::Idle);
                }
            }

            while triggers.try_recv().is_ok() {
                debug!("Dropping refresh requested during the previous cycle");
            }
            // A tick that elapsed mid-cycle is dropped too: wait for the next boundary.
            ticker.reset_at(next_tick_after(started, interval, Instant::now()));
        }

        self.set_state(CycleState::Stopped);
        info!("Balance tracking stopped");
    }

    /// Executes one fetch/aggregate/dispatch cycle. Never returns an error:
    /// failures are logged and reflected in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error occurred while processing balances: {e:#}");
                CycleOutcome::Failed
            }
        };
        self.set_state(CycleState::Idle);
        outcome
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        self.set_state(CycleState::Fetching);

        let rate = self
            .rate_source
            .current_rate()
            .await
            .context("Failed to fetch conversion rate")?;

        let policy = self.retry_policy;
        let primary = with_retry(self.primary.name(), policy, || {
            self.primary.fetch_balances()
        });
        let secondaries = join_all(self.secondaries.iter().map(|source| async move {
            let result = with_retry(source.name(), policy, || source.fetch_balances()).await;
            (source.name(), result)
        }));
        let (primary, secondaries) = tokio::join!(primary, secondaries);

        let mut balances = match primary {
            Ok(balances) => balances,
            Err(e) => {
                error!(source = self.primary.name(), "Primary source unavailable, skipping cycle: {e}");
                return Ok(CycleOutcome::PrimaryUnavailable);
            }
        };

        self.set_state(CycleState::Aggregating);
        for (name, result) in secondaries {
            match result {
                Ok(mut fetched) => {
                    debug!(source = name, count = fetched.len(), "Fetched balances");
                    balances.append(&mut fetched);
                }
                Err(e) => warn!(source = name, "Omitting source from this cycle: {e}"),
            }
        }

        if balances.is_empty() {
            warn!("No balances fetched from any source, skipping cycle");
            return Ok(CycleOutcome::Empty);
        }

        let reference_unit_price = reference_price(&balances, &self.reference_asset);
        if reference_unit_price.is_zero() {
            debug!(
                asset = %self.reference_asset,
                "Reference asset not priced, reference-unit values will be zero"
            );
        }

        self.set_state(CycleState::Dispatching);
        self.display.render(&balances, rate, reference_unit_price);

        let export = async {
            if let Some(exporter) = &self.exporter {
                if let Err(e) = exporter
                    .export_snapshot(&balances, rate, reference_unit_price)
                    .await
                {
                    error!("Failed to export balances: {e:#}");
                }
            }
        };
        let telemetry = async {
            if let Some(sink) = &self.telemetry {
                publish_all(sink.as_ref(), &balances, rate, reference_unit_price).await;
            }
        };
        tokio::join!(export, telemetry);

        info!(count = balances.len(), "Balance cycle completed");
        Ok(CycleOutcome::Completed {
            balances: balances.len(),
        })
    }
}

/// First multiple of `interval` after `started` that lies strictly after `now`.
fn next_tick_after(started: Instant, interval: Duration, now: Instant) -> Instant {
    let elapsed = now.saturating_duration_since(started).as_nanos();
    let periods = elapsed / interval.as_nanos().max(1) + 1;
    started + interval.saturating_mul(u32::try_from(periods).unwrap_or(u32::MAX))
}

/// Price of the first balance whose asset matches `reference_asset`, or zero.
pub fn reference_price(balances: &[Balance], reference_asset: &str) -> Decimal {
    balances
        .iter()
        .find(|b| b.asset().eq_ignore_ascii_case(reference_asset))
        .map_or(Decimal::ZERO, Balance::price)
}

async fn publish_all(
    sink: &dyn TelemetrySink,
    balances: &[Balance],
    rate: Decimal,
    reference_unit_price: Decimal,
) {
    let Snapshot { values, total, .. } = Snapshot::capture(balances, rate, reference_unit_price);

    let per_coin = join_all(
        values
            .iter()
            .map(|value| async move { (value.asset.as_str(), sink.publish(value).await) }),
    );
    let (per_coin, total_result) = tokio::join!(per_coin, sink.publish_total(&total));

    for (asset, result) in per_coin {
        if let Err(e) = result {
            error!(asset, "Failed to publish balance: {e:#}");
        }
    }
    if let Err(e) = total_result {
        error!("Failed to publish portfolio total: {e:#}");
    }
}
