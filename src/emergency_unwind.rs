// emergency_unwind.rs — Emergency Unwind Handler
//
// Restores delta-neutrality after any partial-execution path: mid-BUILD
// one-sided fills, or a post-UNWIND reconciliation residual. Grounded on
// spec.md section 4.7; retry/backoff shape follows the Cycle Controller's
// failure semantics in section 4.5 (bounded retry count, fixed backoff).
use std::time::Duration;

use crate::config::LegConfig;
use crate::errors::EngineError;
use crate::exchange::ExchangeClient;
use crate::market_data::{now_ms, Bbo, MarketDataView, TradeSide};
use crate::pricing::{self, PlacedFill};

const MAX_CLOSE_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct EmergencyUnwindOutcome {
    pub leg_a_closed: Option<PlacedFill>,
    pub leg_b_closed: Option<PlacedFill>,
    /// True iff a post-close reconciliation still shows a residual beyond
    /// one tick on either leg. The cycle loop must halt when this is true.
    pub still_not_flat: bool,
}

/// Queries current positions on both legs and IOC-closes whichever is
/// non-zero, at equal magnitude and opposite side. Never uses POST_ONLY.
/// Re-queries afterward to confirm flat within one tick per leg.
pub async fn emergency_unwind(
    exchange: &dyn ExchangeClient,
    market_data: &MarketDataView,
    leg_a: &LegConfig,
    leg_b: &LegConfig,
) -> Result<EmergencyUnwindOutcome, EngineError> {
    let positions = exchange.get_account_positions().await?;
    let mut outcome = EmergencyUnwindOutcome::default();

    outcome.leg_a_closed = close_residual(exchange, market_data, leg_a, positions.get(&leg_a.contract_id).copied().unwrap_or(0.0)).await?;
    outcome.leg_b_closed = close_residual(exchange, market_data, leg_b, positions.get(&leg_b.contract_id).copied().unwrap_or(0.0)).await?;

    let reconciled = exchange.get_account_positions().await?;
    for leg in [leg_a, leg_b] {
        let residual = reconciled.get(&leg.contract_id).copied().unwrap_or(0.0);
        if residual.abs() > leg.tick_size {
            log::error!("[EMERGENCY] {} still not flat after unwind: residual={:.8}", leg.ticker, residual);
            outcome.still_not_flat = true;
        }
    }

    Ok(outcome)
}

/// Closes one leg's residual position, if any, with bounded retry. Returns
/// `None` if the leg was already flat.
async fn close_residual(
    exchange: &dyn ExchangeClient,
    market_data: &MarketDataView,
    leg: &LegConfig,
    signed_qty: f64,
) -> Result<Option<PlacedFill>, EngineError> {
    if signed_qty.abs() < leg.tick_size {
        return Ok(None);
    }

    let side = if signed_qty > 0.0 { TradeSide::Sell } else { TradeSide::Buy };
    let magnitude = (signed_qty.abs() / leg.tick_size).round() * leg.tick_size;

    log::warn!("[EMERGENCY] closing {} residual={:.8} via IOC {:?}", leg.ticker, signed_qty, side);

    let mut last_err = None;
    for attempt in 1..=MAX_CLOSE_RETRIES {
        let bbo = match current_bbo(exchange, market_data, &leg.contract_id).await {
            Ok(b) => b,
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };
        let notional = magnitude * bbo.mid();
        match pricing::place_ioc(exchange, &leg.contract_id, side, magnitude, bbo, notional, leg.leverage).await {
            Ok(fill) => return Ok(Some(fill)),
            Err(e) => {
                log::error!("[EMERGENCY] {} close attempt {}/{} failed: {}", leg.ticker, attempt, MAX_CLOSE_RETRIES, e);
                last_err = Some(e);
                if attempt < MAX_CLOSE_RETRIES {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| EngineError::Fatal(format!("{} emergency close exhausted retries", leg.ticker))))
}

async fn current_bbo(exchange: &dyn ExchangeClient, market_data: &MarketDataView, contract_id: &str) -> Result<Bbo, EngineError> {
    if let Some(bbo) = market_data.bbo(contract_id) {
        if bbo.is_valid() {
            return Ok(bbo);
        }
    }
    let (bid, ask) = exchange.fetch_bbo_prices(contract_id).await?;
    Ok(Bbo { bid, ask, received_at_ms: now_ms() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeClient, SimExchange};

    fn leg(ticker: &str, tick: f64) -> LegConfig {
        LegConfig { ticker: ticker.to_string(), contract_id: ticker.to_string(), tick_size: tick, leverage: 3.0 }
    }

    #[tokio::test]
    async fn flat_legs_produce_no_closes() {
        let sim = SimExchange::new();
        sim.set_bbo("ETH", 3000.0, 3000.9);
        sim.set_bbo("SOL", 200.0, 200.06);
        let view = MarketDataView::new();
        let a = leg("ETH", 0.01);
        let b = leg("SOL", 0.01);
        let outcome = emergency_unwind(&sim, &view, &a, &b).await.unwrap();
        assert!(outcome.leg_a_closed.is_none());
        assert!(outcome.leg_b_closed.is_none());
        assert!(!outcome.still_not_flat);
    }

    #[tokio::test]
    async fn one_sided_residual_is_closed_and_reconciled_flat() {
        let sim = SimExchange::new();
        sim.set_bbo("ETH", 3000.0, 3000.9);
        sim.set_bbo("SOL", 200.0, 200.06);
        sim.place_ioc_order("ETH", TradeSide::Buy, 0.06, 3000.0, 1000).await.unwrap();
        assert!((sim.position("ETH") - 0.06).abs() < 1e-9);

        let view = MarketDataView::new();
        let a = leg("ETH", 0.01);
        let b = leg("SOL", 0.01);
        let outcome = emergency_unwind(&sim, &view, &a, &b).await.unwrap();

        assert!(outcome.leg_a_closed.is_some());
        assert!(outcome.leg_b_closed.is_none());
        assert!(!outcome.still_not_flat);
        assert!(sim.position("ETH").abs() < 1e-9);
    }
}
