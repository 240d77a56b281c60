// main.rs — Delta-Neutral Pair Execution Engine
//
// Wires together config, the market-data ingestor, the Cycle Controller,
// and the accounting logs. Bootstrap follows the teacher's main.rs: load
// .env, init env_logger, build the exchange client from a dry-run/live
// toggle, spawn background tasks, then drive the core loop.
mod accounting;
mod config;
mod cycle;
mod emergency_unwind;
mod errors;
mod exchange;
mod ingestor;
mod market_data;
mod pricing;
mod signing;
mod sizing;
mod spread_gate;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use accounting::{CycleLog, SpreadAnalysisLog};
use config::{EngineConfig, FeeConfig, PairConfig};
use cycle::CycleController;
use exchange::{ExchangeClient, LiveExchange, SimExchange};
use market_data::MarketDataView;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("delta-pair-engine starting");

    let pair = PairConfig::from_env();
    let engine = EngineConfig::from_env();
    let fees = FeeConfig::from_env();

    log::info!(
        "  pair: {}/{} notional=${:.2} reverse={} dry_run={}",
        pair.leg_a.ticker, pair.leg_b.ticker, pair.notional_usd, pair.reverse_direction, engine.dry_run
    );

    let exchange: Arc<dyn ExchangeClient> = if engine.dry_run {
        log::info!("  exchange: SimExchange (dry run, no real orders)");
        Arc::new(SimExchange::new())
    } else {
        let address = std::env::var("HL_ADDRESS").expect("HL_ADDRESS must be set when ENGINE_DRY_RUN=false");
        let private_key = std::env::var("HL_PRIVATE_KEY").expect("HL_PRIVATE_KEY must be set when ENGINE_DRY_RUN=false");
        let mut live = LiveExchange::new(address, private_key);
        live.init().await.expect("LiveExchange init failed");
        log::info!("  exchange: LiveExchange (LIVE, real orders will be placed)");
        Arc::new(live)
    };

    let market_data = Arc::new(MarketDataView::new());
    let stall_panic = ingestor::new_stall_panic_flag();

    {
        let contracts = vec![pair.leg_a.contract_id.clone(), pair.leg_b.contract_id.clone()];
        let view = market_data.clone();
        let flag = stall_panic.clone();
        tokio::spawn(async move {
            if let Err(e) = ingestor::connect_and_listen(contracts, view, flag).await {
                log::error!("[INGESTOR] crashed: {}", e);
            }
        });
    }
    ingestor::spawn_stall_watcher(market_data.clone(), stall_panic.clone());

    let cycle_log_path = std::env::var("ENGINE_CYCLE_LOG_PATH").unwrap_or_else(|_| "cycle_log.csv".to_string());
    let spread_log_path = std::env::var("ENGINE_SPREAD_LOG_PATH").unwrap_or_else(|_| "spread_log.csv".to_string());
    let cycle_log = Arc::new(CycleLog::open(&cycle_log_path).expect("failed to open cycle log"));
    let spread_log = Arc::new(SpreadAnalysisLog::open(&spread_log_path).expect("failed to open spread-analysis log"));

    let mut controller = CycleController::new(exchange, market_data.clone(), pair, engine.clone(), fees, cycle_log, spread_log);

    log::info!("[MAIN] reconciling any residual position from a previous run");
    if let Err(e) = controller.reconcile_on_startup().await {
        log::error!("[MAIN] startup reconciliation failed, halting: {}", e);
        return;
    }

    log::info!("[MAIN] entering main cycle loop (iterations={})", engine.iterations);
    let mut completed: u64 = 0;
    loop {
        if engine.iterations > 0 && completed >= engine.iterations {
            log::info!("[MAIN] reached configured iteration count ({}), stopping", engine.iterations);
            break;
        }

        if stall_panic.load(Ordering::SeqCst) {
            log::warn!("[MAIN] market-data feed stalled, waiting before starting a new cycle");
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            continue;
        }

        match controller.run_one_cycle().await {
            Ok(outcome) => {
                completed += 1;
                log::debug!("[MAIN] cycle {} complete: {:?}", completed, outcome);
            }
            Err(e) => {
                log::error!("[MAIN] unrecoverable cycle error, halting engine: {}", e);
                break;
            }
        }
    }

    log::info!(
        "[MAIN] stopped. total_cycles={} profitable={} losing={} cumulative_pnl_with_fee=${:.4}",
        controller.summary.total_cycles,
        controller.summary.profitable_cycles,
        controller.summary.losing_cycles,
        controller.summary.cumulative_pnl_with_fee_usd,
    );
}
