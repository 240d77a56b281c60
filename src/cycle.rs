// cycle.rs — Cycle Controller: the core BUILD/MONITOR/UNWIND state machine.
//
// Grounded on spec.md section 4.5. The teacher has no paired-cycle concept
// (it quotes a grid continuously), so the state machine itself is built
// from the spec; the concurrent paired-leg submission follows the teacher's
// `tokio::spawn` background-task idiom (main.rs spawns the stall monitor,
// latency reporter, shadow-PnL reporter as sibling tasks) applied here to a
// join-barrier instead of a detached loop.
use std::sync::Arc;
use std::time::Duration;

use crate::accounting::{self, CompletedCycle, CycleLog, LegFill, Summary};
use crate::config::{EngineConfig, FeeConfig, LegConfig, PairConfig};
use crate::emergency_unwind::{self, EmergencyUnwindOutcome};
use crate::errors::EngineError;
use crate::exchange::ExchangeClient;
use crate::market_data::{now_ms, Bbo, MarketDataView, TradeSide};
use crate::pricing::{self, OrderType, PlacedFill};
use crate::sizing;
use crate::spread_gate::{self, GateDecision, SpreadSnapshot};

const MAX_SUBMIT_RETRIES: u32 = 3;
const SUBMIT_BACKOFF: Duration = Duration::from_secs(2);
const MONITOR_POLL: Duration = Duration::from_secs(1);

/// The controller's live phase. Mirrors spec.md's IDLE/BUILD/MONITOR/UNWIND
/// naming; exposed for status reporting only, the controller itself drives
/// transitions internally within `run_one_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Build,
    Monitor,
    Unwind,
}

/// Why MONITOR ended and UNWIND began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorExitReason {
    ProfitTarget,
    LossLimit,
    Timeout,
}

/// A single leg's BUILD-phase fill, carried through MONITOR into UNWIND.
#[derive(Debug, Clone, Copy)]
struct LegEntry {
    price: f64,
    qty: f64,
    order_type: OrderType,
}

/// Outcome of one call to `run_one_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A cycle record was written (executed or skipped-with-cycle-id).
    Recorded,
    /// Spread Gate said no-go; no cycle_id was assigned.
    NoGoSpread,
}

pub struct CycleController {
    exchange: Arc<dyn ExchangeClient>,
    market_data: Arc<MarketDataView>,
    pair: PairConfig,
    engine: EngineConfig,
    fees: FeeConfig,
    cycle_log: Arc<CycleLog>,
    spread_log: Arc<crate::accounting::SpreadAnalysisLog>,
    next_cycle_id: u64,
    phase: CyclePhase,
    pub summary: Summary,
}

impl CycleController {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        market_data: Arc<MarketDataView>,
        pair: PairConfig,
        engine: EngineConfig,
        fees: FeeConfig,
        cycle_log: Arc<CycleLog>,
        spread_log: Arc<crate::accounting::SpreadAnalysisLog>,
    ) -> Self {
        Self {
            exchange,
            market_data,
            pair,
            engine,
            fees,
            cycle_log,
            spread_log,
            next_cycle_id: 1,
            phase: CyclePhase::Idle,
            summary: Summary::default(),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Restart-time reconciliation: closes any residual the process left
    /// behind before accepting its first Spread Gate decision (spec.md
    /// section 6, "Persisted state").
    pub async fn reconcile_on_startup(&self) -> Result<(), EngineError> {
        self.full_emergency_unwind().await?;
        Ok(())
    }

    /// Drives one full pass of the state machine: Spread Gate → BUILD →
    /// (MONITOR) → UNWIND → reconciliation → log write.
    pub async fn run_one_cycle(&mut self) -> Result<CycleOutcome, EngineError> {
        self.phase = CyclePhase::Idle;

        let decision = if self.engine.spread_wait_timeout_s > 0 {
            spread_gate::wait_for_spread(
                self.market_data.as_ref(),
                &self.pair.leg_a.contract_id,
                &self.pair.leg_b.contract_id,
                self.engine.min_spread_bps,
                self.engine.spread_wait_timeout_s,
            )
            .await
        } else {
            let snap = spread_gate::snapshot(self.market_data.as_ref(), &self.pair.leg_a.contract_id, &self.pair.leg_b.contract_id);
            spread_gate::check(snap, self.engine.min_spread_bps)
        };

        match &decision {
            GateDecision::Go(snap) => self.log_spread(Some(*snap), true, ""),
            GateDecision::NoGo { reason, best_observed } => {
                self.log_spread(*best_observed, false, reason);
                return Ok(CycleOutcome::NoGoSpread);
            }
        }
        let GateDecision::Go(_snap) = decision else { unreachable!() };

        let cycle_id = self.next_cycle_id;
        self.next_cycle_id += 1;
        let entry_ts = now_ms() / 1000;

        self.phase = CyclePhase::Build;
        let (buy_leg, sell_leg) = self.pair.buy_sell_legs();
        let a_is_long = !self.pair.reverse_direction;

        let build = self.build_legs(buy_leg, sell_leg).await?;
        let (entry_a, entry_b) = match build {
            BuildResult::BothFilled { buy, sell } => {
                if a_is_long {
                    (buy, sell)
                } else {
                    (sell, buy)
                }
            }
            BuildResult::OneSided { filled_leg, filled_qty, filled_side } => {
                log::warn!("[CYCLE] cycle {} one-sided fill: {} {:?} qty={:.6}", cycle_id, filled_leg.ticker, filled_side, filled_qty);
                self.full_emergency_unwind().await?;
                self.write_skip(cycle_id, entry_ts, "one-sided fill");
                self.phase = CyclePhase::Idle;
                return Ok(CycleOutcome::Recorded);
            }
            BuildResult::NoFill => {
                self.write_skip(cycle_id, entry_ts, "no fill either leg");
                self.phase = CyclePhase::Idle;
                return Ok(CycleOutcome::Recorded);
            }
            BuildResult::SizingSkipped(reason) => {
                self.write_skip(cycle_id, entry_ts, &reason);
                self.phase = CyclePhase::Idle;
                return Ok(CycleOutcome::Recorded);
            }
        };

        if self.engine.monitor_exit_timing {
            self.phase = CyclePhase::Monitor;
            self.monitor(&entry_a, &entry_b, a_is_long).await;
        }

        self.phase = CyclePhase::Unwind;
        let unwind = self.unwind_legs(&entry_a, &entry_b, a_is_long).await?;
        let (exit_a, exit_b) = unwind;

        if let Err(e) = self.full_emergency_unwind().await {
            self.phase = CyclePhase::Idle;
            return Err(EngineError::ReconciliationFailed(format!("cycle {} could not reach a flat book: {}", cycle_id, e)));
        }

        let exit_ts = now_ms() / 1000;
        let funding_rate_a = self.exchange.get_funding_rate(&self.pair.leg_a.contract_id).await.unwrap_or(0.01);
        let funding_rate_b = self.exchange.get_funding_rate(&self.pair.leg_b.contract_id).await.unwrap_or(0.01);

        let record = accounting::build_cycle_record(&CompletedCycle {
            cycle_id,
            leg_a_ticker: self.pair.leg_a.ticker.clone(),
            leg_b_ticker: self.pair.leg_b.ticker.clone(),
            a_is_long,
            entry_a: LegFill { price: entry_a.price, qty: entry_a.qty, order_type: entry_a.order_type },
            entry_b: LegFill { price: entry_b.price, qty: entry_b.qty, order_type: entry_b.order_type },
            exit_a: LegFill { price: exit_a.price, qty: exit_a.qty, order_type: exit_a.order_type },
            exit_b: LegFill { price: exit_b.price, qty: exit_b.qty, order_type: exit_b.order_type },
            entry_ts,
            exit_ts,
            fee_config: self.fees,
            funding_rate_a,
            funding_rate_b,
        });
        self.summary.record(&record);
        if let Err(e) = self.cycle_log.append(&record) {
            log::error!("[CYCLE] failed to append cycle {} record: {}", cycle_id, e);
        }

        self.phase = CyclePhase::Idle;
        Ok(CycleOutcome::Recorded)
    }

    fn log_spread(&self, snap: Option<SpreadSnapshot>, executed: bool, skip_reason: &str) {
        let record = match snap {
            Some(s) => crate::accounting::SpreadAnalysisRecord {
                timestamp_ms: now_ms(),
                pair_spread_bps: s.pair_spread_bps,
                leg_a_spread_bps: s.leg_a_spread_bps,
                leg_b_spread_bps: s.leg_b_spread_bps,
                leg_a_bid: s.leg_a_bid,
                leg_a_ask: s.leg_a_ask,
                leg_b_bid: s.leg_b_bid,
                leg_b_ask: s.leg_b_ask,
                executed,
                skip_reason: skip_reason.to_string(),
            },
            None => crate::accounting::SpreadAnalysisRecord {
                timestamp_ms: now_ms(),
                pair_spread_bps: 0.0,
                leg_a_spread_bps: 0.0,
                leg_b_spread_bps: 0.0,
                leg_a_bid: 0.0,
                leg_a_ask: 0.0,
                leg_b_bid: 0.0,
                leg_b_ask: 0.0,
                executed,
                skip_reason: skip_reason.to_string(),
            },
        };
        if let Err(e) = self.spread_log.append(&record) {
            log::error!("[CYCLE] failed to append spread-analysis record: {}", e);
        }
    }

    fn write_skip(&mut self, cycle_id: u64, entry_ts: u64, reason: &str) {
        log::warn!("[CYCLE] cycle {} skipped: {}", cycle_id, reason);
        let record = accounting::skipped_cycle_record(cycle_id, entry_ts, reason);
        self.summary.record(&record);
        if let Err(e) = self.cycle_log.append(&record) {
            log::error!("[CYCLE] failed to append skipped cycle {} record: {}", cycle_id, e);
        }
    }

    /// Submits both legs' entry orders concurrently and classifies the
    /// outcome. Sizing runs first and is not retried: a below-minimum size
    /// is a deterministic skip, not a transient failure.
    async fn build_legs(&self, buy_leg: &LegConfig, sell_leg: &LegConfig) -> Result<BuildResult, EngineError> {
        let per_leg_notional = self.pair.per_leg_notional();

        let buy_bbo = self.current_bbo(&buy_leg.contract_id).await?;
        let sell_bbo = self.current_bbo(&sell_leg.contract_id).await?;

        let buy_depth = self.exchange.get_bookdepth_handler(&buy_leg.contract_id).await;
        let sell_depth = self.exchange.get_bookdepth_handler(&sell_leg.contract_id).await;

        let buy_sizing = sizing::compute_size(
            buy_leg, per_leg_notional, TradeSide::Buy, self.engine.max_slippage_bps,
            buy_bbo.mid(), buy_depth.as_ref().map(|d| d as &dyn crate::market_data::BookDepth),
        );
        let sell_sizing = sizing::compute_size(
            sell_leg, per_leg_notional, TradeSide::Sell, self.engine.max_slippage_bps,
            sell_bbo.mid(), sell_depth.as_ref().map(|d| d as &dyn crate::market_data::BookDepth),
        );

        if let Some(reason) = buy_sizing.skip_reason {
            let _ = reason;
            return Ok(BuildResult::SizingSkipped(format!("leg {} size below minimum", buy_leg.ticker)));
        }
        if let Some(reason) = sell_sizing.skip_reason {
            let _ = reason;
            return Ok(BuildResult::SizingSkipped(format!("leg {} size below minimum", sell_leg.ticker)));
        }
        if buy_sizing.quantity <= 0.0 || sell_sizing.quantity <= 0.0 {
            return Ok(BuildResult::SizingSkipped("leg sizing collapsed to zero quantity".to_string()));
        }

        let exchange = self.exchange.clone();
        let buy_contract = buy_leg.contract_id.clone();
        let buy_qty = buy_sizing.quantity;
        let buy_notional = buy_qty * buy_bbo.mid();
        let buy_leverage = buy_leg.leverage;
        let buy_tick = buy_leg.tick_size;
        let use_post_only = self.engine.use_post_only_entry;
        let post_only_timeout_s = self.engine.post_only_timeout_s;

        let exchange_b = self.exchange.clone();
        let sell_contract = sell_leg.contract_id.clone();
        let sell_qty = sell_sizing.quantity;
        let sell_notional = sell_qty * sell_bbo.mid();
        let sell_leverage = sell_leg.leverage;
        let sell_tick = sell_leg.tick_size;

        let buy_task = tokio::spawn(async move {
            pricing::place_entry_or_exit(
                exchange.as_ref(), &buy_contract, TradeSide::Buy, buy_qty, buy_bbo, buy_notional, buy_leverage,
                use_post_only, post_only_timeout_s, buy_tick,
            )
            .await
        });
        let sell_task = tokio::spawn(async move {
            pricing::place_entry_or_exit(
                exchange_b.as_ref(), &sell_contract, TradeSide::Sell, sell_qty, sell_bbo, sell_notional, sell_leverage,
                use_post_only, post_only_timeout_s, sell_tick,
            )
            .await
        });

        let (buy_res, sell_res) = tokio::join!(buy_task, sell_task);
        let buy_fill = buy_res.map_err(|e| EngineError::Fatal(format!("BUILD buy task panicked: {}", e)))?;
        let sell_fill = sell_res.map_err(|e| EngineError::Fatal(format!("BUILD sell task panicked: {}", e)))?;

        match (buy_fill, sell_fill) {
            (Ok(buy), Ok(sell)) if buy.filled_qty >= buy_tick && sell.filled_qty >= sell_tick => {
                Ok(BuildResult::BothFilled {
                    buy: LegEntry { price: buy.avg_price, qty: buy.filled_qty, order_type: buy.order_type },
                    sell: LegEntry { price: sell.avg_price, qty: sell.filled_qty, order_type: sell.order_type },
                })
            }
            (Ok(buy), _) if buy.filled_qty >= buy_tick => {
                Ok(BuildResult::OneSided { filled_leg: buy_leg.clone(), filled_qty: buy.filled_qty, filled_side: TradeSide::Buy })
            }
            (_, Ok(sell)) if sell.filled_qty >= sell_tick => {
                Ok(BuildResult::OneSided { filled_leg: sell_leg.clone(), filled_qty: sell.filled_qty, filled_side: TradeSide::Sell })
            }
            _ => Ok(BuildResult::NoFill),
        }
    }

    /// UNWIND: closes both legs at opposite side, equal magnitude to entry.
    /// Both legs are spawned before either is awaited, per spec.md section 4.5.
    async fn unwind_legs(&self, entry_a: &LegEntry, entry_b: &LegEntry, a_is_long: bool) -> Result<(LegEntry, LegEntry), EngineError> {
        let leg_a = self.pair.leg_a.clone();
        let leg_b = self.pair.leg_b.clone();
        let side_a = if a_is_long { TradeSide::Sell } else { TradeSide::Buy };
        let side_b = if a_is_long { TradeSide::Buy } else { TradeSide::Sell };

        let bbo_a = self.current_bbo(&leg_a.contract_id).await?;
        let bbo_b = self.current_bbo(&leg_b.contract_id).await?;

        let use_post_only = self.engine.use_post_only_entry;
        let post_only_timeout_s = self.engine.post_only_timeout_s;

        let task_a = tokio::spawn(retry_close_leg(
            self.exchange.clone(), leg_a.contract_id.clone(), side_a, entry_a.qty, bbo_a, entry_a.qty * bbo_a.mid(), leg_a.leverage, leg_a.tick_size,
            use_post_only, post_only_timeout_s,
        ));
        let task_b = tokio::spawn(retry_close_leg(
            self.exchange.clone(), leg_b.contract_id.clone(), side_b, entry_b.qty, bbo_b, entry_b.qty * bbo_b.mid(), leg_b.leverage, leg_b.tick_size,
            use_post_only, post_only_timeout_s,
        ));

        let (res_a, res_b) = tokio::join!(task_a, task_b);
        let result_a = res_a.map_err(|e| EngineError::Fatal(format!("UNWIND leg A task panicked: {}", e)))?;
        let result_b = res_b.map_err(|e| EngineError::Fatal(format!("UNWIND leg B task panicked: {}", e)))?;

        match (result_a, result_b) {
            (Ok(a), Ok(b)) => Ok((
                LegEntry { price: a.avg_price, qty: a.filled_qty, order_type: a.order_type },
                LegEntry { price: b.avg_price, qty: b.filled_qty, order_type: b.order_type },
            )),
            (Ok(a), Err(e)) => {
                log::error!("[CYCLE] {} closed but {} unwind failed: {}", leg_a.ticker, leg_b.ticker, e);
                self.full_emergency_unwind().await?;
                Ok((
                    LegEntry { price: a.avg_price, qty: a.filled_qty, order_type: a.order_type },
                    LegEntry { price: bbo_b.mid(), qty: entry_b.qty, order_type: OrderType::Ioc },
                ))
            }
            (Err(e), Ok(b)) => {
                log::error!("[CYCLE] {} closed but {} unwind failed: {}", leg_b.ticker, leg_a.ticker, e);
                self.full_emergency_unwind().await?;
                Ok((
                    LegEntry { price: bbo_a.mid(), qty: entry_a.qty, order_type: OrderType::Ioc },
                    LegEntry { price: b.avg_price, qty: b.filled_qty, order_type: b.order_type },
                ))
            }
            (Err(ea), Err(eb)) => {
                log::error!("[CYCLE] both legs failed to unwind: {} / {}", ea, eb);
                self.full_emergency_unwind().await?;
                Ok((
                    LegEntry { price: bbo_a.mid(), qty: entry_a.qty, order_type: OrderType::Ioc },
                    LegEntry { price: bbo_b.mid(), qty: entry_b.qty, order_type: OrderType::Ioc },
                ))
            }
        }
    }

    /// Re-queries both legs' positions and IOC-closes whichever is
    /// non-zero. Used after any partial UNWIND failure; always checks both
    /// legs since a position query, not the caller's hint, is the source of
    /// truth (spec.md section 5).
    async fn full_emergency_unwind(&self) -> Result<EmergencyUnwindOutcome, EngineError> {
        let outcome = emergency_unwind::emergency_unwind(
            self.exchange.as_ref(),
            self.market_data.as_ref(),
            &self.pair.leg_a,
            &self.pair.leg_b,
        )
        .await?;
        if outcome.still_not_flat {
            return Err(EngineError::ReconciliationFailed("emergency unwind could not restore a flat book".into()));
        }
        Ok(outcome)
    }

    /// Polls unrealized PnL at 1 Hz until a MONITOR exit condition fires or
    /// `monitor_timeout_s` elapses. Exit conditions are checked in the order
    /// spec.md section 4.5 requires: profit target, then loss limit, then
    /// timeout.
    async fn monitor(&self, entry_a: &LegEntry, entry_b: &LegEntry, a_is_long: bool) -> MonitorExitReason {
        let entry_notional = entry_a.price * entry_a.qty + entry_b.price * entry_b.qty;
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(self.engine.monitor_timeout_s);

        loop {
            if let (Some(bbo_a), Some(bbo_b)) =
                (self.market_data.bbo(&self.pair.leg_a.contract_id), self.market_data.bbo(&self.pair.leg_b.contract_id))
            {
                let unrealized_a = accounting::leg_pnl(a_is_long, entry_a.price, bbo_a.mid(), entry_a.qty);
                let unrealized_b = accounting::leg_pnl(!a_is_long, entry_b.price, bbo_b.mid(), entry_b.qty);
                let pnl_bps = if entry_notional > 0.0 { 10_000.0 * (unrealized_a + unrealized_b) / entry_notional } else { 0.0 };

                if pnl_bps >= self.engine.min_profit_bps {
                    return MonitorExitReason::ProfitTarget;
                }
                if pnl_bps <= self.engine.loss_limit_bps {
                    return MonitorExitReason::LossLimit;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return MonitorExitReason::Timeout;
            }
            tokio::time::sleep(MONITOR_POLL).await;
        }
    }

    async fn current_bbo(&self, contract_id: &str) -> Result<Bbo, EngineError> {
        if let Some(bbo) = self.market_data.bbo(contract_id) {
            if bbo.is_valid() {
                return Ok(bbo);
            }
        }
        let (bid, ask) = self.exchange.fetch_bbo_prices(contract_id).await?;
        Ok(Bbo { bid, ask, received_at_ms: now_ms() })
    }
}

enum BuildResult {
    BothFilled { buy: LegEntry, sell: LegEntry },
    OneSided { filled_leg: LegConfig, filled_qty: f64, filled_side: TradeSide },
    NoFill,
    SizingSkipped(String),
}

/// Bounded retry (up to 3 attempts, fixed 2s backoff) around a single leg's
/// normal-exit close, used by UNWIND. Routes through `place_entry_or_exit`
/// so a configured POST_ONLY exit is attempted before falling back to IOC,
/// same as entry (spec.md section 4.3: "normal exit orders: same as
/// entry"); only emergency-unwind always goes straight to IOC. Takes an
/// owned `Arc<dyn ExchangeClient>` rather than `&self` so both legs can be
/// spawned as independent tasks joined with `tokio::join!` before either is
/// awaited.
async fn retry_close_leg(
    exchange: Arc<dyn ExchangeClient>,
    contract_id: String,
    side: TradeSide,
    qty: f64,
    bbo: Bbo,
    notional_usd: f64,
    leverage: f64,
    tick_size: f64,
    use_post_only: bool,
    post_only_timeout_s: u64,
) -> Result<PlacedFill, EngineError> {
    let mut last_err = None;
    for attempt in 1..=MAX_SUBMIT_RETRIES {
        match pricing::place_entry_or_exit(
            exchange.as_ref(), &contract_id, side, qty, bbo, notional_usd, leverage, use_post_only, post_only_timeout_s, tick_size,
        )
        .await
        {
            Ok(fill) if fill.filled_qty >= qty - tick_size => return Ok(fill),
            Ok(fill) => {
                log::warn!("[CYCLE] {} unwind attempt {} partial fill {:.6}/{:.6}", contract_id, attempt, fill.filled_qty, qty);
                last_err = Some(EngineError::OrderRejected(format!("{} partially filled on unwind", contract_id)));
            }
            Err(e) => {
                log::error!("[CYCLE] {} unwind attempt {}/{} failed: {}", contract_id, attempt, MAX_SUBMIT_RETRIES, e);
                last_err = Some(e);
            }
        }
        if attempt < MAX_SUBMIT_RETRIES {
            tokio::time::sleep(SUBMIT_BACKOFF).await;
        }
    }
    Err(last_err.unwrap_or_else(|| EngineError::Fatal(format!("{} unwind exhausted retries", contract_id))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{CycleLog, SpreadAnalysisLog};
    use crate::exchange::SimExchange;
    use crate::market_data::{Bbo, DepthLevel, OrderBookSnapshot};
    use tempfile_free::NamedTempPath;

    // A minimal drop-in replacement for a temp-file crate: writes under the
    // OS temp dir with a unique name and removes itself on drop, since this
    // workspace does not carry `tempfile` as a dependency.
    mod tempfile_free {
        use std::path::PathBuf;

        pub struct NamedTempPath(pub PathBuf);

        impl NamedTempPath {
            pub fn new(label: &str) -> Self {
                let mut p = std::env::temp_dir();
                p.push(format!("delta-pair-engine-test-{}-{}.csv", label, std::process::id()));
                NamedTempPath(p)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for NamedTempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    fn leg(ticker: &str, tick: f64) -> LegConfig {
        LegConfig { ticker: ticker.to_string(), contract_id: ticker.to_string(), tick_size: tick, leverage: 3.0 }
    }

    fn controller(sim: Arc<SimExchange>, cycle_path: &std::path::Path, spread_path: &std::path::Path) -> CycleController {
        let pair = PairConfig {
            leg_a: leg("ETH", 0.01),
            leg_b: leg("SOL", 0.01),
            notional_usd: 400.0,
            reverse_direction: false,
        };
        let mut engine = EngineConfig::default();
        engine.spread_wait_timeout_s = 0;
        engine.monitor_exit_timing = false;
        engine.min_spread_bps = 1.0;

        let view = Arc::new(MarketDataView::new());
        view.update_bbo("ETH", Bbo { bid: 3000.0, ask: 3000.9, received_at_ms: 0 });
        view.update_bbo("SOL", Bbo { bid: 200.0, ask: 200.06, received_at_ms: 0 });
        view.update_depth(
            "ETH",
            OrderBookSnapshot { bids: vec![DepthLevel { price: 2999.0, size: 1000.0 }], asks: vec![DepthLevel { price: 3001.0, size: 1000.0 }] },
        );
        view.update_depth(
            "SOL",
            OrderBookSnapshot { bids: vec![DepthLevel { price: 199.0, size: 1000.0 }], asks: vec![DepthLevel { price: 201.0, size: 1000.0 }] },
        );
        sim.set_bbo("ETH", 3000.0, 3000.9);
        sim.set_bbo("SOL", 200.0, 200.06);
        sim.set_depth("ETH", OrderBookSnapshot { bids: vec![DepthLevel { price: 2999.0, size: 1000.0 }], asks: vec![DepthLevel { price: 3001.0, size: 1000.0 }] });
        sim.set_depth("SOL", OrderBookSnapshot { bids: vec![DepthLevel { price: 199.0, size: 1000.0 }], asks: vec![DepthLevel { price: 201.0, size: 1000.0 }] });

        CycleController::new(
            sim,
            view,
            pair,
            engine,
            FeeConfig::default(),
            Arc::new(CycleLog::open(cycle_path).unwrap()),
            Arc::new(SpreadAnalysisLog::open(spread_path).unwrap()),
        )
    }

    #[tokio::test]
    async fn nominal_cycle_builds_unwinds_and_records() {
        let cycle_tmp = tempfile_free::NamedTempPath::new("cycle");
        let spread_tmp = tempfile_free::NamedTempPath::new("spread");
        let sim = Arc::new(SimExchange::new());
        let mut ctl = controller(sim.clone(), cycle_tmp.path(), spread_tmp.path());

        let outcome = ctl.run_one_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Recorded);
        assert_eq!(ctl.summary.total_cycles, 1);
        assert!((sim.position("ETH")).abs() < 1e-6);
        assert!((sim.position("SOL")).abs() < 1e-6);
        assert_eq!(ctl.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn narrow_spread_returns_nogo_without_assigning_cycle_id() {
        let cycle_tmp = tempfile_free::NamedTempPath::new("cycle2");
        let spread_tmp = tempfile_free::NamedTempPath::new("spread2");
        let sim = Arc::new(SimExchange::new());
        let mut ctl = controller(sim, cycle_tmp.path(), spread_tmp.path());
        ctl.engine.min_spread_bps = 10_000.0;

        let outcome = ctl.run_one_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoGoSpread);
        assert_eq!(ctl.summary.total_cycles, 0);
        assert_eq!(ctl.next_cycle_id, 1);
    }
}
