// sizing.rs — Liquidity-aware Sizing & Slippage Estimator
//
// Stateless pure transform: leg + target notional + direction + slippage
// ceiling + reference price (+ optional BookDepth) -> (quantity,
// estimated_slippage_bps, sufficient_liquidity_flag). Grounded on spec.md
// section 4.2; no direct teacher analogue (the teacher quotes a static
// grid rather than sizing against a slippage budget), so the algorithm
// here is built from the spec and expressed in the teacher's functional,
// no-hidden-state style (see market_maker::compute_quote_grid).
use crate::config::LegConfig;
use crate::market_data::{BookDepth, TradeSide, INVALID_SLIPPAGE_BPS};

pub const DEFAULT_SLIPPAGE_CEILING_BPS: f64 = 10.0;

/// Result of a sizing decision for one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingResult {
    pub quantity: f64,
    pub estimated_slippage_bps: f64,
    pub sufficient_liquidity: bool,
    /// Non-empty iff the cycle should be skipped because of this leg.
    pub skip_reason: Option<&'static SkipReasonKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReasonKind {
    BelowMinimum,
}

/// Rounds `qty` down to the nearest multiple of `tick_size`.
fn quantize_floor(qty: f64, tick_size: f64) -> f64 {
    (qty / tick_size).floor() * tick_size
}

/// Computes a tick-quantized quantity for `leg` given `target_notional_usd`
/// at `reference_price`, bounded by `slippage_ceiling_bps` when `depth` is
/// available, else a conservative half-size fallback.
///
/// The minimum-size check happens BEFORE quantization: rounding a raw
/// quantity smaller than one tick down to a multiple of the tick size
/// would silently produce `quantity = 0`, which a naive slippage check
/// then reports as "0 bps" (a zero-quantity walk of the book is trivially
/// zero slippage) — masking the true cause (size) behind a misleading
/// "slippage too high" message. See spec.md section 9.
pub fn compute_size(
    leg: &LegConfig,
    target_notional_usd: f64,
    direction: TradeSide,
    slippage_ceiling_bps: f64,
    reference_price: f64,
    depth: Option<&dyn BookDepth>,
) -> SizingResult {
    let raw_qty = target_notional_usd / reference_price;

    if raw_qty < leg.tick_size {
        log::warn!(
            "[SIZING] {} order size below exchange minimum: raw_qty={:.8} < tick={:.8}",
            leg.ticker, raw_qty, leg.tick_size
        );
        return SizingResult {
            quantity: 0.0,
            estimated_slippage_bps: INVALID_SLIPPAGE_BPS,
            sufficient_liquidity: false,
            skip_reason: Some(&SkipReasonKind::BelowMinimum),
        };
    }

    let target_qty = quantize_floor(raw_qty, leg.tick_size);

    let Some(depth) = depth else {
        log::warn!(
            "[SIZING] {} BookDepth unavailable — falling back to conservative half-size.",
            leg.ticker
        );
        return SizingResult {
            quantity: target_qty * 0.5,
            estimated_slippage_bps: 20.0,
            sufficient_liquidity: false,
            skip_reason: None,
        };
    };

    let target_notional = target_qty * reference_price;
    let final_qty = binary_search_quantity(
        depth, direction, reference_price, target_notional, slippage_ceiling_bps, leg.tick_size,
    );

    let available = depth.get_available_liquidity(direction.consumes(), 20);
    let sufficient_liquidity = available >= final_qty;
    let estimated_slippage_bps = if final_qty > 0.0 {
        depth.estimate_slippage(direction, final_qty)
    } else {
        0.0
    };

    SizingResult { quantity: final_qty, estimated_slippage_bps, sufficient_liquidity, skip_reason: None }
}

/// Binary-searches over notional in `[0, target_notional]` (>=10
/// iterations) for the largest notional whose estimated slippage is <=
/// `ceiling_bps`, then tick-quantizes the resulting quantity. The upper
/// bound is clamped to `target_notional` itself: this function only ever
/// shrinks a cycle's size to respect the slippage ceiling, it never grows
/// it past the configured target.
fn binary_search_quantity(
    depth: &dyn BookDepth,
    direction: TradeSide,
    reference_price: f64,
    target_notional: f64,
    ceiling_bps: f64,
    tick_size: f64,
) -> f64 {
    let mut lo = 0.0_f64;
    let mut hi = target_notional;
    let mut best_notional = 0.0_f64;

    for _ in 0..24 {
        let mid = (lo + hi) / 2.0;
        let qty = mid / reference_price;
        let bps = if qty > 0.0 { depth.estimate_slippage(direction, qty) } else { INVALID_SLIPPAGE_BPS };
        if bps <= ceiling_bps {
            best_notional = mid;
            lo = mid;
        } else {
            hi = mid;
        }
    }

    quantize_floor(best_notional / reference_price, tick_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{DepthLevel, OrderBookSnapshot};

    fn leg(tick: f64) -> LegConfig {
        LegConfig { ticker: "ETH".into(), contract_id: "ETH".into(), tick_size: tick, leverage: 3.0 }
    }

    fn deep_book() -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: vec![DepthLevel { price: 2999.0, size: 1000.0 }],
            asks: vec![DepthLevel { price: 3001.0, size: 1000.0 }],
        }
    }

    #[test]
    fn below_minimum_returns_invalid_sentinel_before_quantizing() {
        let l = leg(0.1);
        let res = compute_size(&l, 100.0, TradeSide::Buy, 10.0, 3000.0, None);
        assert_eq!(res.quantity, 0.0);
        assert_eq!(res.estimated_slippage_bps, INVALID_SLIPPAGE_BPS);
        assert!(!res.sufficient_liquidity);
        assert_eq!(res.skip_reason, Some(&SkipReasonKind::BelowMinimum));
    }

    #[test]
    fn exact_tick_boundary_does_not_skip() {
        let l = leg(0.1);
        // raw_qty = 100/1000 = 0.1 == tick_size exactly.
        let res = compute_size(&l, 100.0, TradeSide::Buy, 10.0, 1000.0, None);
        assert!(res.skip_reason.is_none());
    }

    #[test]
    fn missing_depth_yields_conservative_half_size() {
        let l = leg(0.01);
        let res = compute_size(&l, 200.0, TradeSide::Buy, 10.0, 3000.0, None);
        let target_qty = (200.0_f64 / 3000.0 / 0.01).floor() * 0.01;
        assert_eq!(res.quantity, target_qty * 0.5);
        assert_eq!(res.estimated_slippage_bps, 20.0);
        assert!(!res.sufficient_liquidity);
    }

    #[test]
    fn deep_book_sizes_at_full_target_with_zero_slippage() {
        let l = leg(0.001);
        let book = deep_book();
        let res = compute_size(&l, 200.0, TradeSide::Buy, 10.0, 3000.0, Some(&book));
        let target_qty = (200.0_f64 / 3000.0 / 0.001).floor() * 0.001;
        assert!((res.quantity - target_qty).abs() < 1e-6);
        assert!(res.sufficient_liquidity);
    }

    #[test]
    fn thin_book_shrinks_quantity_to_respect_ceiling() {
        let l = leg(0.001);
        let thin = OrderBookSnapshot {
            bids: vec![],
            asks: vec![
                DepthLevel { price: 3000.0, size: 0.05 },
                DepthLevel { price: 3010.0, size: 10.0 },
            ],
        };
        let res = compute_size(&l, 200.0, TradeSide::Buy, 10.0, 3000.0, Some(&thin));
        // Should not walk deep enough to exceed 10 bps; quantity stays small.
        assert!(res.quantity <= 0.05 + 1e-6);
        assert!(res.estimated_slippage_bps <= 10.0 + 1e-6);
    }
}
