// market_data.rs — Market-Data View
//
// Read-only projection of BBO and BookDepth for both legs. Grounded on the
// teacher's MarketDataBuffer (ingestor.rs): a shared struct behind a
// std::sync::Mutex, updated by a background streaming task and snapshotted
// by readers without blocking the writer for long.
use std::collections::HashMap;
use std::sync::Mutex;

/// Sentinel returned by `BookDepth::estimate_slippage` for invalid input
/// (qty == 0) and used as the conservative fallback when BookDepth is
/// unavailable is NOT this value — see sizing.rs. Zero must never be
/// mistaken for "ok" slippage.
pub const INVALID_SLIPPAGE_BPS: f64 = 999_999.0;

/// Best bid and best ask for one leg. Both must be positive; ask >= bid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbo {
    pub bid: f64,
    pub ask: f64,
    pub received_at_ms: u64,
}

impl Bbo {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread in basis points: 10000 * (ask - bid) / bid.
    pub fn spread_bps(&self) -> f64 {
        if self.bid <= 0.0 {
            return INVALID_SLIPPAGE_BPS;
        }
        10_000.0 * (self.ask - self.bid) / self.bid
    }

    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask >= self.bid
    }
}

/// Side of the book a size is walked against. `"buy"`/`"sell"` map to
/// ask/bid for `estimate_slippage`; `"bid"`/`"ask"` name the resting side
/// directly for `get_available_liquidity`. The reference implementation
/// conflates these two vocabularies (see DESIGN.md Open Questions); this
/// spec keeps them as distinct newtypes to make the mapping explicit at
/// every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

impl TradeSide {
    /// `buy` consumes asks, `sell` consumes bids.
    pub fn consumes(self) -> BookSide {
        match self {
            TradeSide::Buy => BookSide::Ask,
            TradeSide::Sell => BookSide::Bid,
        }
    }
}

/// A single resting price level.
#[derive(Debug, Clone, Copy)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
}

/// Aggregated resting quantity per price level on each side of one leg's
/// book. Implementations walk from the top of book outward.
pub trait BookDepth: Send + Sync {
    /// Volume-weighted deviation from the top price, in basis points, of
    /// walking `side` until `quantity` is filled. `quantity == 0` is
    /// invalid input and MUST return `INVALID_SLIPPAGE_BPS`.
    fn estimate_slippage(&self, side: TradeSide, quantity: f64) -> f64;

    /// Cumulative resting size up to `max_depth` levels on `side`.
    fn get_available_liquidity(&self, side: BookSide, max_depth: usize) -> f64;
}

/// A concrete order-book snapshot: levels sorted outward from the top.
#[derive(Debug, Clone, Default)]
pub struct OrderBookSnapshot {
    /// Descending by price.
    pub bids: Vec<DepthLevel>,
    /// Ascending by price.
    pub asks: Vec<DepthLevel>,
}

impl BookDepth for OrderBookSnapshot {
    fn estimate_slippage(&self, side: TradeSide, quantity: f64) -> f64 {
        if quantity <= 0.0 {
            return INVALID_SLIPPAGE_BPS;
        }
        let levels: &[DepthLevel] = match side.consumes() {
            BookSide::Ask => &self.asks,
            BookSide::Bid => &self.bids,
        };
        let Some(top) = levels.first() else {
            return INVALID_SLIPPAGE_BPS;
        };
        let top_price = top.price;
        if top_price <= 0.0 {
            return INVALID_SLIPPAGE_BPS;
        }

        let mut remaining = quantity;
        let mut notional_weighted_dev = 0.0; // sum(|px - top| * filled_qty)
        let mut filled = 0.0;
        for level in levels {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(level.size);
            notional_weighted_dev += (level.price - top_price).abs() * take;
            filled += take;
            remaining -= take;
        }
        if filled <= 0.0 {
            return INVALID_SLIPPAGE_BPS;
        }
        // Book exhausted before filling the full quantity: treat the
        // unfilled remainder as maximal adverse deviation so the caller's
        // ceiling comparison correctly rejects it.
        if remaining > 1e-12 {
            return INVALID_SLIPPAGE_BPS;
        }
        let avg_dev = notional_weighted_dev / filled;
        (avg_dev / top_price) * 10_000.0
    }

    fn get_available_liquidity(&self, side: BookSide, max_depth: usize) -> f64 {
        let levels: &[DepthLevel] = match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        };
        levels.iter().take(max_depth).map(|l| l.size).sum()
    }
}

/// Per-leg market data: latest BBO plus an optional depth snapshot. The
/// depth snapshot is `None` until the first `l2Book` message arrives for
/// that leg, matching the "BookDepth handle absent" contract in spec.md.
#[derive(Debug, Clone, Default)]
pub struct LegMarketData {
    pub bbo: Option<Bbo>,
    pub depth: Option<OrderBookSnapshot>,
}

/// Shared read-projection over both legs' market data. Updated by the
/// ingestor task, read (without blocking the writer for long) by the
/// Cycle Controller, Sizing Estimator, and Spread Gate.
#[derive(Debug, Default)]
pub struct MarketDataView {
    inner: Mutex<HashMap<String, LegMarketData>>,
    pub last_message_ms: Mutex<u64>,
}

impl MarketDataView {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()), last_message_ms: Mutex::new(now_ms()) }
    }

    pub fn touch(&self) {
        *self.last_message_ms.lock().unwrap() = now_ms();
    }

    pub fn is_stalled(&self, timeout_secs: u64) -> bool {
        let last = *self.last_message_ms.lock().unwrap();
        now_ms().saturating_sub(last) > timeout_secs * 1_000
    }

    pub fn update_bbo(&self, contract_id: &str, bbo: Bbo) {
        self.touch();
        let mut map = self.inner.lock().unwrap();
        map.entry(contract_id.to_string()).or_default().bbo = Some(bbo);
    }

    pub fn update_depth(&self, contract_id: &str, depth: OrderBookSnapshot) {
        self.touch();
        let mut map = self.inner.lock().unwrap();
        let entry = map.entry(contract_id.to_string()).or_default();
        // Derive BBO from the depth snapshot's top levels so a depth-only
        // feed still keeps the spread gate and sizing estimator fed.
        if let (Some(bid), Some(ask)) = (depth.bids.first(), depth.asks.first()) {
            entry.bbo = Some(Bbo { bid: bid.price, ask: ask.price, received_at_ms: now_ms() });
        }
        entry.depth = Some(depth);
    }

    pub fn bbo(&self, contract_id: &str) -> Option<Bbo> {
        self.inner.lock().unwrap().get(contract_id).and_then(|l| l.bbo)
    }

    /// Returns a cloned depth snapshot, or `None` if no BookDepth handle
    /// has been populated yet for this leg (caller falls back to
    /// conservative sizing per sizing.rs).
    pub fn depth(&self, contract_id: &str) -> Option<OrderBookSnapshot> {
        self.inner.lock().unwrap().get(contract_id).and_then(|l| l.depth.clone())
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: bids.iter().map(|&(price, size)| DepthLevel { price, size }).collect(),
            asks: asks.iter().map(|&(price, size)| DepthLevel { price, size }).collect(),
        }
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let b = book(&[(99.0, 10.0)], &[(100.0, 10.0)]);
        assert_eq!(b.estimate_slippage(TradeSide::Buy, 0.0), INVALID_SLIPPAGE_BPS);
    }

    #[test]
    fn fill_within_top_level_has_zero_slippage() {
        let b = book(&[(99.0, 10.0)], &[(100.0, 10.0)]);
        assert_eq!(b.estimate_slippage(TradeSide::Buy, 5.0), 0.0);
    }

    #[test]
    fn fill_spanning_two_levels_is_volume_weighted() {
        let b = book(&[], &[(100.0, 5.0), (101.0, 5.0)]);
        // buy 10: 5 @ 100 (dev 0), 5 @ 101 (dev 1) -> avg dev 0.5 -> 50 bps
        let bps = b.estimate_slippage(TradeSide::Buy, 10.0);
        assert!((bps - 50.0).abs() < 1e-9);
    }

    #[test]
    fn exhausted_book_is_invalid() {
        let b = book(&[], &[(100.0, 1.0)]);
        assert_eq!(b.estimate_slippage(TradeSide::Buy, 10.0), INVALID_SLIPPAGE_BPS);
    }

    #[test]
    fn available_liquidity_sums_up_to_max_depth() {
        let b = book(&[(99.0, 3.0), (98.0, 4.0), (97.0, 5.0)], &[]);
        assert_eq!(b.get_available_liquidity(BookSide::Bid, 2), 7.0);
        assert_eq!(b.get_available_liquidity(BookSide::Bid, 100), 12.0);
    }

    #[test]
    fn bbo_spread_bps_matches_definition() {
        let bbo = Bbo { bid: 200.0, ask: 200.06, received_at_ms: 0 };
        assert!((bbo.spread_bps() - 3.0).abs() < 1e-9);
    }
}
