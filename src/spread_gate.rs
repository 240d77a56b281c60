// spread_gate.rs — Spread Gate & Entry-Timing Controller
//
// Pre-trade filter plus an optional bounded poll for a better spread.
// Grounded on spec.md section 4.4; structurally mirrors the teacher's
// polling-loop idiom (main.rs's 100ms quoting loop, ingestor's stall
// watcher) but bounded by a max-wait timeout instead of running forever.
use crate::market_data::MarketDataView;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadSnapshot {
    pub pair_spread_bps: f64,
    pub leg_a_spread_bps: f64,
    pub leg_b_spread_bps: f64,
    pub leg_a_bid: f64,
    pub leg_a_ask: f64,
    pub leg_b_bid: f64,
    pub leg_b_ask: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Go(SpreadSnapshot),
    NoGo { reason: String, best_observed: Option<SpreadSnapshot> },
}

/// Reads the current BBO for both legs and computes the pair spread.
/// Returns `None` if either leg has no BBO yet (caller treats this as
/// BBOUnavailable, see errors.rs).
pub fn snapshot(view: &MarketDataView, leg_a_contract: &str, leg_b_contract: &str) -> Option<SpreadSnapshot> {
    let a = view.bbo(leg_a_contract)?;
    let b = view.bbo(leg_b_contract)?;
    if !a.is_valid() || !b.is_valid() {
        return None;
    }
    let leg_a_spread_bps = a.spread_bps();
    let leg_b_spread_bps = b.spread_bps();
    Some(SpreadSnapshot {
        pair_spread_bps: (leg_a_spread_bps + leg_b_spread_bps) / 2.0,
        leg_a_spread_bps,
        leg_b_spread_bps,
        leg_a_bid: a.bid,
        leg_a_ask: a.ask,
        leg_b_bid: b.bid,
        leg_b_ask: b.ask,
    })
}

/// Single pre-trade check against `min_spread_bps`. No waiting.
pub fn check(snap: Option<SpreadSnapshot>, min_spread_bps: f64) -> GateDecision {
    match snap {
        None => GateDecision::NoGo { reason: "BBO unavailable for one or both legs".to_string(), best_observed: None },
        Some(s) if s.pair_spread_bps < min_spread_bps => GateDecision::NoGo {
            reason: format!("spread too narrow {:.1} bps < {:.1}", s.pair_spread_bps, min_spread_bps),
            best_observed: Some(s),
        },
        Some(s) => GateDecision::Go(s),
    }
}

/// Polls the Market-Data View at >=2 Hz for up to `max_wait_secs`,
/// returning Go as soon as any snapshot clears `min_spread_bps`, or NoGo
/// with the best-observed snapshot on timeout.
pub async fn wait_for_spread(
    view: &MarketDataView,
    leg_a_contract: &str,
    leg_b_contract: &str,
    min_spread_bps: f64,
    max_wait_secs: u64,
) -> GateDecision {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(max_wait_secs);
    let mut best: Option<SpreadSnapshot> = None;

    loop {
        let snap = snapshot(view, leg_a_contract, leg_b_contract);
        if let Some(s) = snap {
            if best.map_or(true, |b| s.pair_spread_bps > b.pair_spread_bps) {
                best = Some(s);
            }
            if s.pair_spread_bps >= min_spread_bps {
                return GateDecision::Go(s);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return GateDecision::NoGo {
                reason: format!(
                    "spread-wait timeout after {}s, best observed {:.1} bps < {:.1}",
                    max_wait_secs,
                    best.map(|b| b.pair_spread_bps).unwrap_or(0.0),
                    min_spread_bps
                ),
                best_observed: best,
            };
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(400)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Bbo;

    #[test]
    fn narrow_spread_is_rejected() {
        let view = MarketDataView::new();
        view.update_bbo("ETH", Bbo { bid: 3000.0, ask: 3000.30, received_at_ms: 0 }); // 1 bps
        view.update_bbo("SOL", Bbo { bid: 200.0, ask: 200.02, received_at_ms: 0 });   // 1 bps
        let snap = snapshot(&view, "ETH", "SOL");
        let decision = check(snap, 20.0);
        match decision {
            GateDecision::NoGo { reason, .. } => assert!(reason.contains("spread too narrow")),
            GateDecision::Go(_) => panic!("expected NoGo"),
        }
    }

    #[test]
    fn spread_exactly_at_threshold_proceeds() {
        let view = MarketDataView::new();
        // bid 100, ask 100.2 -> 20 bps exactly
        view.update_bbo("ETH", Bbo { bid: 100.0, ask: 100.2, received_at_ms: 0 });
        view.update_bbo("SOL", Bbo { bid: 100.0, ask: 100.2, received_at_ms: 0 });
        let snap = snapshot(&view, "ETH", "SOL");
        assert!(matches!(check(snap, 20.0), GateDecision::Go(_)));
    }

    #[test]
    fn missing_bbo_is_nogo() {
        let view = MarketDataView::new();
        let snap = snapshot(&view, "ETH", "SOL");
        assert!(snap.is_none());
        assert!(matches!(check(snap, 20.0), GateDecision::NoGo { .. }));
    }
}
