// accounting.rs — PnL & Fee Accountant, Cycle Log, Spread-Analysis Log, Summary.
//
// Grounded on spec.md sections 4.6 and 6. The append-only CSV writer uses the
// `csv` crate (declared but never exercised by the teacher) wrapped in a
// Mutex, following the teacher's persistence.rs idiom of a single owned file
// handle with serialized writes; the cycle-record shape itself has no direct
// teacher analogue since the teacher is a market maker with no paired-cycle
// concept.
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use crate::config::FeeConfig;
use crate::pricing::OrderType;

fn fee_rate_bps(order_type: OrderType, fees: FeeConfig) -> f64 {
    match order_type {
        OrderType::Ioc => fees.taker_bps,
        OrderType::PostOnly => fees.maker_bps,
    }
}

/// Directional PnL for one leg: `(exit - entry) * qty` if long, `(entry -
/// exit) * qty` if short.
pub fn leg_pnl(is_long: bool, entry_price: f64, exit_price: f64, qty: f64) -> f64 {
    if is_long {
        (exit_price - entry_price) * qty
    } else {
        (entry_price - exit_price) * qty
    }
}

/// `|qty| * price * fee_rate_bps / 10000`.
pub fn fee_usd(qty: f64, price: f64, fee_rate_bps: f64) -> f64 {
    qty.abs() * price * (fee_rate_bps / 10_000.0)
}

/// `notional * annual_rate / 365 / 3 * hold_hours`, signed by leg direction.
/// The `/3` is the count of 8-hour funding intervals per day and must never
/// be replaced by `/24` (see spec.md section 4.6 and scenario S6).
pub fn funding_pnl(notional_usd: f64, annual_rate: f64, hold_hours: f64, is_long: bool) -> f64 {
    let magnitude = notional_usd * annual_rate / 365.0 / 3.0 * hold_hours;
    if is_long {
        magnitude
    } else {
        -magnitude
    }
}

/// One executed leg's fill, used by both BUILD (entry) and UNWIND (exit).
#[derive(Debug, Clone, Copy)]
pub struct LegFill {
    pub price: f64,
    pub qty: f64,
    pub order_type: OrderType,
}

/// Inputs needed to build one completed (non-skip) cycle record.
pub struct CompletedCycle {
    pub cycle_id: u64,
    pub leg_a_ticker: String,
    pub leg_b_ticker: String,
    /// True if leg A was the bought (long) leg this cycle.
    pub a_is_long: bool,
    pub entry_a: LegFill,
    pub entry_b: LegFill,
    pub exit_a: LegFill,
    pub exit_b: LegFill,
    pub entry_ts: u64,
    pub exit_ts: u64,
    pub fee_config: FeeConfig,
    pub funding_rate_a: f64,
    pub funding_rate_b: f64,
}

/// One row of the Cycle Log, matching the column order in spec.md section 6.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub direction: String,
    pub entry_ts: u64,
    pub exit_ts: u64,
    pub hold_s: u64,
    pub entry_a_px: f64,
    pub entry_a_qty: f64,
    pub entry_b_px: f64,
    pub entry_b_qty: f64,
    pub exit_a_px: f64,
    pub exit_a_qty: f64,
    pub exit_b_px: f64,
    pub exit_b_qty: f64,
    pub entry_a_type: String,
    pub entry_b_type: String,
    pub exit_a_type: String,
    pub exit_b_type: String,
    pub fees_usd: f64,
    pub funding_pnl_usd: f64,
    pub pnl_no_fee_usd: f64,
    pub pnl_with_fee_usd: f64,
    pub skip_reason: String,
}

/// Builds a completed cycle record and computes PnL/fees/funding per
/// spec.md section 4.6. Signed entry/exit quantities follow the sign
/// convention in the data model: long positive, short negative.
pub fn build_cycle_record(c: &CompletedCycle) -> CycleRecord {
    let hold_s = c.exit_ts.saturating_sub(c.entry_ts);
    let hold_hours = hold_s as f64 / 3600.0;

    let pnl_a = leg_pnl(c.a_is_long, c.entry_a.price, c.exit_a.price, c.entry_a.qty);
    let pnl_b = leg_pnl(!c.a_is_long, c.entry_b.price, c.exit_b.price, c.entry_b.qty);
    let pnl_no_fee_usd = pnl_a + pnl_b;

    let fees_usd = fee_usd(c.entry_a.qty, c.entry_a.price, fee_rate_bps(c.entry_a.order_type, c.fee_config))
        + fee_usd(c.entry_b.qty, c.entry_b.price, fee_rate_bps(c.entry_b.order_type, c.fee_config))
        + fee_usd(c.exit_a.qty, c.exit_a.price, fee_rate_bps(c.exit_a.order_type, c.fee_config))
        + fee_usd(c.exit_b.qty, c.exit_b.price, fee_rate_bps(c.exit_b.order_type, c.fee_config));

    let notional_a = c.entry_a.qty * c.entry_a.price;
    let notional_b = c.entry_b.qty * c.entry_b.price;
    let funding_pnl_usd =
        funding_pnl(notional_a, c.funding_rate_a, hold_hours, c.a_is_long) + funding_pnl(notional_b, c.funding_rate_b, hold_hours, !c.a_is_long);

    let pnl_with_fee_usd = pnl_no_fee_usd - fees_usd + funding_pnl_usd;

    let (buy_leg, sell_leg) = if c.a_is_long { (&c.leg_a_ticker, &c.leg_b_ticker) } else { (&c.leg_b_ticker, &c.leg_a_ticker) };

    CycleRecord {
        cycle_id: c.cycle_id,
        direction: format!("buy={} sell={}", buy_leg, sell_leg),
        entry_ts: c.entry_ts,
        exit_ts: c.exit_ts,
        hold_s,
        entry_a_px: c.entry_a.price,
        entry_a_qty: if c.a_is_long { c.entry_a.qty } else { -c.entry_a.qty },
        entry_b_px: c.entry_b.price,
        entry_b_qty: if c.a_is_long { -c.entry_b.qty } else { c.entry_b.qty },
        exit_a_px: c.exit_a.price,
        exit_a_qty: if c.a_is_long { -c.exit_a.qty } else { c.exit_a.qty },
        exit_b_px: c.exit_b.price,
        exit_b_qty: if c.a_is_long { c.exit_b.qty } else { -c.exit_b.qty },
        entry_a_type: c.entry_a.order_type.as_str().to_string(),
        entry_b_type: c.entry_b.order_type.as_str().to_string(),
        exit_a_type: c.exit_a.order_type.as_str().to_string(),
        exit_b_type: c.exit_b.order_type.as_str().to_string(),
        fees_usd,
        funding_pnl_usd,
        pnl_no_fee_usd,
        pnl_with_fee_usd,
        skip_reason: String::new(),
    }
}

/// A cycle record for a cycle that was not executed (spread too narrow,
/// insufficient size, one-sided fill, ...). All price/qty/fee fields are
/// zero; `skip_reason` carries the diagnosis.
pub fn skipped_cycle_record(cycle_id: u64, entry_ts: u64, skip_reason: &str) -> CycleRecord {
    CycleRecord {
        cycle_id,
        direction: String::new(),
        entry_ts,
        exit_ts: entry_ts,
        hold_s: 0,
        entry_a_px: 0.0,
        entry_a_qty: 0.0,
        entry_b_px: 0.0,
        entry_b_qty: 0.0,
        exit_a_px: 0.0,
        exit_a_qty: 0.0,
        exit_b_px: 0.0,
        exit_b_qty: 0.0,
        entry_a_type: String::new(),
        entry_b_type: String::new(),
        exit_a_type: String::new(),
        exit_b_type: String::new(),
        fees_usd: 0.0,
        funding_pnl_usd: 0.0,
        pnl_no_fee_usd: 0.0,
        pnl_with_fee_usd: 0.0,
        skip_reason: skip_reason.to_string(),
    }
}

/// Append-only per-cycle CSV log. Writes are serialized through a mutex even
/// though the controller is single-threaded for cycle progression, matching
/// the "no lock contention expected but a mutex is required for safety"
/// guarantee in spec.md section 5.
pub struct CycleLog {
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl CycleLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let existed = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = WriterBuilder::new().has_headers(!existed).from_writer(file);
        Ok(Self { writer: Mutex::new(writer) })
    }

    pub fn append(&self, record: &CycleRecord) -> io::Result<()> {
        let mut w = self.writer.lock().unwrap();
        w.serialize(record)?;
        w.flush()
    }
}

/// One row of the spread-analysis log: every Spread Gate evaluation, not
/// just executed cycles.
#[derive(Debug, Clone, Serialize)]
pub struct SpreadAnalysisRecord {
    pub timestamp_ms: u64,
    pub pair_spread_bps: f64,
    pub leg_a_spread_bps: f64,
    pub leg_b_spread_bps: f64,
    pub leg_a_bid: f64,
    pub leg_a_ask: f64,
    pub leg_b_bid: f64,
    pub leg_b_ask: f64,
    pub executed: bool,
    pub skip_reason: String,
}

pub struct SpreadAnalysisLog {
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl SpreadAnalysisLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let existed = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = WriterBuilder::new().has_headers(!existed).from_writer(file);
        Ok(Self { writer: Mutex::new(writer) })
    }

    pub fn append(&self, record: &SpreadAnalysisRecord) -> io::Result<()> {
        let mut w = self.writer.lock().unwrap();
        w.serialize(record)?;
        w.flush()
    }
}

/// In-memory counters across all cycles in this run. Mutated only by the
/// accountant, read by reporting.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total_cycles: u64,
    pub profitable_cycles: u64,
    pub losing_cycles: u64,
    pub zero_cycles: u64,
    pub best_cycle_pnl: Option<f64>,
    pub worst_cycle_pnl: Option<f64>,
    pub cumulative_fees_usd: f64,
    pub cumulative_pnl_no_fee_usd: f64,
    pub cumulative_pnl_with_fee_usd: f64,
}

impl Summary {
    /// Records a non-skip cycle's result. Skip cycles do not count toward
    /// profitable/losing/zero (spec.md section 8's "total_non_skip_cycles").
    pub fn record(&mut self, record: &CycleRecord) {
        self.total_cycles += 1;
        if record.pnl_with_fee_usd > 0.0 {
            self.profitable_cycles += 1;
        } else if record.pnl_with_fee_usd < 0.0 {
            self.losing_cycles += 1;
        } else {
            self.zero_cycles += 1;
        }
        self.best_cycle_pnl = Some(self.best_cycle_pnl.map_or(record.pnl_with_fee_usd, |b| b.max(record.pnl_with_fee_usd)));
        self.worst_cycle_pnl = Some(self.worst_cycle_pnl.map_or(record.pnl_with_fee_usd, |w| w.min(record.pnl_with_fee_usd)));
        self.cumulative_fees_usd += record.fees_usd;
        self.cumulative_pnl_no_fee_usd += record.pnl_no_fee_usd;
        self.cumulative_pnl_with_fee_usd += record.pnl_with_fee_usd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_leg_pnl_is_exit_minus_entry() {
        assert!((leg_pnl(true, 3000.0, 3001.9, 0.06) - (3001.9 - 3000.0) * 0.06).abs() < 1e-9);
    }

    #[test]
    fn short_leg_pnl_is_entry_minus_exit() {
        assert!((leg_pnl(false, 200.06, 200.1, 1.0) - (200.06 - 200.1)).abs() < 1e-9);
    }

    #[test]
    fn funding_uses_eight_hour_interval_not_24h() {
        // scenario S6: notional 1000, r=0.0109, h=8 -> ~0.0796, not the /24 value ~0.00996
        let pnl = funding_pnl(1000.0, 0.0109, 8.0, true);
        assert!((pnl - 0.0796_f64).abs() < 1e-3);
        // a buggy /24 implementation (days, not 8h intervals) would report ~0.00996
        let wrong_24h = 1000.0 * 0.0109 / 365.0 / 24.0 * 8.0;
        assert!((pnl - wrong_24h).abs() > 0.05);
    }

    #[test]
    fn funding_sign_inverts_for_short_leg() {
        let long = funding_pnl(1000.0, 0.0109, 8.0, true);
        let short = funding_pnl(1000.0, 0.0109, 8.0, false);
        assert!((long + short).abs() < 1e-9);
    }

    #[test]
    fn accounting_identity_holds() {
        let c = CompletedCycle {
            cycle_id: 1,
            leg_a_ticker: "ETH".into(),
            leg_b_ticker: "SOL".into(),
            a_is_long: true,
            entry_a: LegFill { price: 3000.0, qty: 0.06, order_type: OrderType::PostOnly },
            entry_b: LegFill { price: 200.06, qty: 1.0, order_type: OrderType::PostOnly },
            exit_a: LegFill { price: 3001.9, qty: 0.06, order_type: OrderType::PostOnly },
            exit_b: LegFill { price: 200.1, qty: 1.0, order_type: OrderType::PostOnly },
            entry_ts: 0,
            exit_ts: 20,
            fee_config: FeeConfig { taker_bps: 5.0, maker_bps: 2.0 },
            funding_rate_a: 0.0,
            funding_rate_b: 0.0,
        };
        let record = build_cycle_record(&c);
        let identity = record.pnl_no_fee_usd - record.fees_usd + record.funding_pnl_usd;
        assert!((record.pnl_with_fee_usd - identity).abs() < 1e-9);
    }

    #[test]
    fn scenario_s1_nominal_cycle_matches_spec_numbers() {
        let c = CompletedCycle {
            cycle_id: 1,
            leg_a_ticker: "ETH".into(),
            leg_b_ticker: "SOL".into(),
            a_is_long: true,
            entry_a: LegFill { price: 3000.0, qty: 0.06, order_type: OrderType::PostOnly },
            entry_b: LegFill { price: 200.06, qty: 1.0, order_type: OrderType::PostOnly },
            exit_a: LegFill { price: 3001.9, qty: 0.06, order_type: OrderType::PostOnly },
            exit_b: LegFill { price: 200.1, qty: 1.0, order_type: OrderType::PostOnly },
            entry_ts: 0,
            exit_ts: 20,
            fee_config: FeeConfig { taker_bps: 5.0, maker_bps: 2.0 },
            funding_rate_a: 0.0,
            funding_rate_b: 0.0,
        };
        let record = build_cycle_record(&c);
        // pnl_no_fee matches spec.md's worked S1 number exactly: the two leg
        // PnLs don't depend on the approximation in the fee estimate below.
        assert!((record.pnl_no_fee_usd - 0.074).abs() < 1e-3);
        // spec.md approximates fees as 4 * 200 * 2bps, but actual per-fill
        // notional varies slightly around 200 at these fill prices — check
        // against the precise formula instead of the illustrative figure.
        let expected_fees = fee_usd(0.06, 3000.0, 2.0)
            + fee_usd(1.0, 200.06, 2.0)
            + fee_usd(0.06, 3001.9, 2.0)
            + fee_usd(1.0, 200.1, 2.0);
        assert!((record.fees_usd - expected_fees).abs() < 1e-9);
        assert!(record.pnl_with_fee_usd < 0.0);
    }

    #[test]
    fn summary_best_worst_track_without_zero_bias() {
        let mut s = Summary::default();
        let mut r1 = skipped_cycle_record(1, 0, "");
        r1.pnl_with_fee_usd = -5.0;
        s.record(&r1);
        let mut r2 = skipped_cycle_record(2, 0, "");
        r2.pnl_with_fee_usd = -1.0;
        s.record(&r2);
        assert_eq!(s.best_cycle_pnl, Some(-1.0));
        assert_eq!(s.worst_cycle_pnl, Some(-5.0));
        assert_eq!(s.losing_cycles, 2);
    }
}
