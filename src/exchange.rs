// exchange.rs — Exchange client contract and two implementations.
//
// Grounded on the teacher's exchange.rs: OrderError's flat-enum-with-Display
// shape, LiveExchange's post_info/post_exchange REST plumbing and
// round_to_5_sig_figs/round_f64/float_to_wire helpers, and signing::sign_l1_action
// for order submission. The trait surface itself is rebuilt against the
// contract in spec.md section 6 (fetch_bbo_prices, get_bookdepth_handler,
// place_ioc_order, place_open_order, cancel_order, wait_for_fill,
// get_account_positions, get_funding_rate) rather than the teacher's MM-grid
// surface (open_order/close_position/cancel_all_orders/...), since paired-leg
// order operations run concurrently (tokio::join!) and therefore need shared
// (&self) access rather than the teacher's &mut self.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::market_data::{OrderBookSnapshot, TradeSide};
use crate::signing::sign_l1_action;

#[derive(Debug, Clone)]
pub enum OrderError {
    InsufficientFunds(String),
    MaxPositionsReached,
    InvalidOrder(String),
    NetworkError(String),
    RateLimited,
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderError::InsufficientFunds(s) => write!(f, "Insufficient Funds: {}", s),
            OrderError::MaxPositionsReached => write!(f, "Max Positions Reached"),
            OrderError::InvalidOrder(s) => write!(f, "Invalid Order: {}", s),
            OrderError::NetworkError(s) => write!(f, "Network Error: {}", s),
            OrderError::RateLimited => write!(f, "Rate Limited (429)"),
        }
    }
}

impl std::error::Error for OrderError {}

/// Outcome of a completed or attempted fill-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    Filled,
    PartiallyFilled,
    Cancelled,
    TimedOut,
    Rejected,
}

/// Immediate result of an order submission.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub status: FillStatus,
    pub filled_size: f64,
    pub avg_price: f64,
    pub fees_paid: Option<f64>,
}

/// Result of a `wait_for_fill` poll.
#[derive(Debug, Clone)]
pub struct FillInfo {
    pub status: FillStatus,
    pub filled_size: f64,
    pub avg_price: f64,
}

// ─── Exchange Trait ────────────────────────────────────────────────

/// The engine requires these operations on each leg's client (spec.md section
/// 6). All methods take `&self` — BUILD/UNWIND submit both legs concurrently
/// via `tokio::join!`, so implementations hold state behind interior
/// mutability (`Mutex`) rather than requiring exclusive access.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_bbo_prices(&self, contract_id: &str) -> Result<(f64, f64), OrderError>;

    /// Returns `None` if no BookDepth handle is available yet for this
    /// contract (caller falls back to conservative sizing, see sizing.rs).
    async fn get_bookdepth_handler(&self, contract_id: &str) -> Option<OrderBookSnapshot>;

    async fn place_ioc_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError>;

    async fn place_open_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), OrderError>;

    async fn wait_for_fill(&self, order_id: &str, timeout_seconds: u64) -> Result<FillInfo, OrderError>;

    /// Signed quantity per contract id (long positive, short negative).
    async fn get_account_positions(&self) -> Result<HashMap<String, f64>, OrderError>;

    /// Annualized funding rate. May be cached; a stale/missing value should
    /// fall back to a conservative default rather than block the cycle.
    async fn get_funding_rate(&self, contract_id: &str) -> Result<f64, OrderError>;
}

// ─── Sim Exchange (In-Memory) ──────────────────────────────────────

struct SimState {
    positions: HashMap<String, f64>,
    bbo: HashMap<String, (f64, f64)>,
    depth: HashMap<String, OrderBookSnapshot>,
    funding_rates: HashMap<String, f64>,
    next_order_id: u64,
}

/// In-memory exchange for dry runs and tests. Orders fill immediately and
/// fully at the submitted price — there is no resting-order queue to model,
/// mirroring the teacher's SimExchange which also fills synchronously.
pub struct SimExchange {
    state: Mutex<SimState>,
}

impl SimExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                positions: HashMap::new(),
                bbo: HashMap::new(),
                depth: HashMap::new(),
                funding_rates: HashMap::new(),
                next_order_id: 1,
            }),
        }
    }

    pub fn set_bbo(&self, contract_id: &str, bid: f64, ask: f64) {
        self.state.lock().unwrap().bbo.insert(contract_id.to_string(), (bid, ask));
    }

    pub fn set_depth(&self, contract_id: &str, depth: OrderBookSnapshot) {
        self.state.lock().unwrap().depth.insert(contract_id.to_string(), depth);
    }

    pub fn set_funding_rate(&self, contract_id: &str, annual_rate: f64) {
        self.state.lock().unwrap().funding_rates.insert(contract_id.to_string(), annual_rate);
    }

    pub fn position(&self, contract_id: &str) -> f64 {
        self.state.lock().unwrap().positions.get(contract_id).copied().unwrap_or(0.0)
    }

    fn fill(state: &mut SimState, contract_id: &str, side: TradeSide, qty: f64, price: f64) -> OrderResult {
        let signed = match side {
            TradeSide::Buy => qty,
            TradeSide::Sell => -qty,
        };
        *state.positions.entry(contract_id.to_string()).or_insert(0.0) += signed;
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        OrderResult {
            order_id: order_id.to_string(),
            status: FillStatus::Filled,
            filled_size: qty,
            avg_price: price,
            fees_paid: None,
        }
    }
}

impl Default for SimExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for SimExchange {
    async fn fetch_bbo_prices(&self, contract_id: &str) -> Result<(f64, f64), OrderError> {
        self.state
            .lock()
            .unwrap()
            .bbo
            .get(contract_id)
            .copied()
            .ok_or_else(|| OrderError::InvalidOrder(format!("no BBO seeded for {}", contract_id)))
    }

    async fn get_bookdepth_handler(&self, contract_id: &str) -> Option<OrderBookSnapshot> {
        self.state.lock().unwrap().depth.get(contract_id).cloned()
    }

    async fn place_ioc_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        _isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::fill(&mut state, contract_id, side, qty, price))
    }

    async fn place_open_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        _isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::fill(&mut state, contract_id, side, qty, price))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), OrderError> {
        Ok(())
    }

    async fn wait_for_fill(&self, _order_id: &str, _timeout_seconds: u64) -> Result<FillInfo, OrderError> {
        // Sim orders are resolved synchronously at submission time; any
        // caller that reaches here is waiting on an order we already filled.
        Ok(FillInfo { status: FillStatus::Filled, filled_size: 0.0, avg_price: 0.0 })
    }

    async fn get_account_positions(&self) -> Result<HashMap<String, f64>, OrderError> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn get_funding_rate(&self, contract_id: &str) -> Result<f64, OrderError> {
        Ok(self.state.lock().unwrap().funding_rates.get(contract_id).copied().unwrap_or(0.01))
    }
}

// ─── Live Exchange (Hyperliquid) ────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssetInfo {
    pub sz_decimals: u32,
    pub max_leverage: u32,
}

const CACHE_DURATION: Duration = Duration::from_secs(2);

pub struct LiveExchange {
    pub base_url: String,
    pub account_address: String,
    pub private_key: String,
    pub client: reqwest::Client,
    pub coin_to_asset: HashMap<String, u32>,
    pub asset_info: HashMap<u32, AssetInfo>,
    cached_bbo: Mutex<HashMap<String, (f64, f64, Instant)>>,
    cached_depth: Mutex<HashMap<String, (OrderBookSnapshot, Instant)>>,
    cached_positions: Mutex<Option<(HashMap<String, f64>, Instant)>>,
    cached_funding: Mutex<HashMap<String, (f64, Instant)>>,
}

impl LiveExchange {
    pub fn new(account_address: String, private_key: String) -> Self {
        Self {
            base_url: "https://api.hyperliquid.xyz".to_string(),
            account_address,
            private_key,
            client: reqwest::Client::new(),
            coin_to_asset: HashMap::new(),
            asset_info: HashMap::new(),
            cached_bbo: Mutex::new(HashMap::new()),
            cached_depth: Mutex::new(HashMap::new()),
            cached_positions: Mutex::new(None),
            cached_funding: Mutex::new(HashMap::new()),
        }
    }

    pub async fn init(&mut self) -> Result<(), OrderError> {
        log::info!("[EXCHANGE] fetching universe metadata");
        let payload = serde_json::json!({ "type": "meta" });
        let data = self.post_info(payload).await?;

        if let Some(universe) = data["universe"].as_array() {
            for (i, asset) in universe.iter().enumerate() {
                if let Some(name) = asset["name"].as_str() {
                    let asset_idx = i as u32;
                    self.coin_to_asset.insert(name.to_string(), asset_idx);
                    let sz_decimals = asset["szDecimals"].as_u64().unwrap_or(4) as u32;
                    let max_leverage = asset["maxLeverage"].as_u64().unwrap_or(20) as u32;
                    self.asset_info.insert(asset_idx, AssetInfo { sz_decimals, max_leverage });
                }
            }
        }
        log::info!("[EXCHANGE] loaded {} assets", self.coin_to_asset.len());
        Ok(())
    }

    fn resolve_asset(&self, contract_id: &str) -> Result<u32, OrderError> {
        self.coin_to_asset
            .get(contract_id)
            .copied()
            .ok_or_else(|| OrderError::InvalidOrder(format!("unknown contract: {}", contract_id)))
    }

    async fn post_info(&self, payload: serde_json::Value) -> Result<serde_json::Value, OrderError> {
        let resp = self
            .client
            .post(format!("{}/info", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| OrderError::NetworkError(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(OrderError::RateLimited);
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| OrderError::NetworkError(e.to_string()))?;

        if let Some(err) = data["error"].as_str() {
            if err.contains("rate limited") {
                return Err(OrderError::RateLimited);
            }
        }
        Ok(data)
    }

    /// `isolated_margin_x6` rides alongside `action` in the POST body rather
    /// than inside the signed payload — the signature covers only the order
    /// action, nonce, and vault marker (see signing::compute_action_hash);
    /// margin mode is a sibling exchange parameter, same as `vaultAddress`.
    async fn post_exchange(
        &self,
        action: serde_json::Value,
        nonce: u64,
        signature: crate::signing::Signature,
        isolated_margin_x6: Option<i64>,
    ) -> Result<serde_json::Value, OrderError> {
        let mut payload = serde_json::json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": serde_json::Value::Null,
        });
        if let Some(margin) = isolated_margin_x6 {
            payload["isolatedMarginX6"] = serde_json::Value::from(margin);
        }

        let resp = self
            .client
            .post(format!("{}/exchange", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| OrderError::NetworkError(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(OrderError::RateLimited);
        }

        let text = resp.text().await.map_err(|e| OrderError::NetworkError(e.to_string()))?;
        let data: serde_json::Value = serde_json::from_str(&text).map_err(|e| OrderError::NetworkError(e.to_string()))?;

        if data["status"].as_str() == Some("err") {
            let err_msg = data["response"].as_str().unwrap_or("unknown error").to_string();
            if err_msg.contains("rate limited") || err_msg.contains("cumulative requests") {
                return Err(OrderError::RateLimited);
            }
            return Err(OrderError::InvalidOrder(err_msg));
        }
        Ok(data)
    }

    async fn fetch_l2_book(&self, contract_id: &str) -> Result<OrderBookSnapshot, OrderError> {
        let payload = serde_json::json!({ "type": "l2Book", "coin": contract_id });
        let data = self.post_info(payload).await?;
        let levels = data["levels"].as_array().ok_or_else(|| OrderError::InvalidOrder("malformed l2Book response".into()))?;

        let parse_side = |side: &serde_json::Value| -> Vec<crate::market_data::DepthLevel> {
            side.as_array()
                .map(|levels| {
                    levels
                        .iter()
                        .filter_map(|l| {
                            let price = l["px"].as_str()?.parse::<f64>().ok()?;
                            let size = l["sz"].as_str()?.parse::<f64>().ok()?;
                            Some(crate::market_data::DepthLevel { price, size })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let bids = levels.first().map(parse_side).unwrap_or_default();
        let asks = levels.get(1).map(parse_side).unwrap_or_default();
        Ok(OrderBookSnapshot { bids, asks })
    }

    async fn submit_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        tif: &str,
        isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError> {
        let asset_idx = self.resolve_asset(contract_id)?;
        let is_buy = matches!(side, TradeSide::Buy);
        let sz_decimals = self.asset_info.get(&asset_idx).map(|i| i.sz_decimals).unwrap_or(4);

        let price_rounded = round_to_5_sig_figs(price);
        let size_rounded = round_f64(qty, sz_decimals as usize);
        let limit_px = float_to_wire(price_rounded);
        let sz = float_to_wire(size_rounded);
        let nonce = crate::market_data::now_ms();

        let orders = vec![crate::signing::OrderRequest {
            asset: asset_idx,
            is_buy,
            limit_px,
            sz,
            reduce_only: false,
            order_type: crate::signing::OrderTypeWire::Limit(crate::signing::LimitOrderWire { tif: tif.to_string() }),
        }];
        let action_wire = crate::signing::ActionWire { r#type: "order".to_string(), orders, grouping: "na".to_string() };

        let (sig, action_json) = sign_l1_action(&self.private_key, action_wire, nonce)
            .await
            .map_err(|e| OrderError::InvalidOrder(e.to_string()))?;
        let result = self.post_exchange(action_json, nonce, sig, Some(isolated_margin_x6)).await?;

        let status0 = result["response"]["data"]["statuses"]
            .as_array()
            .and_then(|v| v.first().cloned())
            .unwrap_or(serde_json::Value::Null);

        if let Some(err) = status0["error"].as_str() {
            return Err(OrderError::InvalidOrder(err.to_string()));
        }
        if let Some(filled) = status0.get("filled") {
            let total_sz = filled["totalSz"].as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(size_rounded);
            let avg_px = filled["avgPx"].as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(price_rounded);
            let oid = filled["oid"].as_u64().unwrap_or(0);
            return Ok(OrderResult {
                order_id: format!("{}:{}", asset_idx, oid),
                status: FillStatus::Filled,
                filled_size: total_sz,
                avg_price: avg_px,
                fees_paid: None,
            });
        }
        if let Some(resting) = status0.get("resting") {
            let oid = resting["oid"].as_u64().unwrap_or(0);
            return Ok(OrderResult {
                order_id: format!("{}:{}", asset_idx, oid),
                status: FillStatus::PartiallyFilled,
                filled_size: 0.0,
                avg_price: 0.0,
                fees_paid: None,
            });
        }
        Err(OrderError::InvalidOrder("unrecognized order status response".to_string()))
    }
}

#[async_trait]
impl ExchangeClient for LiveExchange {
    async fn fetch_bbo_prices(&self, contract_id: &str) -> Result<(f64, f64), OrderError> {
        if let Some((bid, ask, ts)) = self.cached_bbo.lock().unwrap().get(contract_id) {
            if ts.elapsed() < CACHE_DURATION {
                return Ok((*bid, *ask));
            }
        }
        let book = self.fetch_l2_book(contract_id).await?;
        let bid = book.bids.first().ok_or_else(|| OrderError::InvalidOrder("empty bid side".into()))?.price;
        let ask = book.asks.first().ok_or_else(|| OrderError::InvalidOrder("empty ask side".into()))?.price;
        self.cached_bbo.lock().unwrap().insert(contract_id.to_string(), (bid, ask, Instant::now()));
        Ok((bid, ask))
    }

    async fn get_bookdepth_handler(&self, contract_id: &str) -> Option<OrderBookSnapshot> {
        if let Some((depth, ts)) = self.cached_depth.lock().unwrap().get(contract_id) {
            if ts.elapsed() < CACHE_DURATION {
                return Some(depth.clone());
            }
        }
        let book = self.fetch_l2_book(contract_id).await.ok()?;
        self.cached_depth.lock().unwrap().insert(contract_id.to_string(), (book.clone(), Instant::now()));
        Some(book)
    }

    async fn place_ioc_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError> {
        self.submit_order(contract_id, side, qty, price, "Ioc", isolated_margin_x6).await
    }

    async fn place_open_order(
        &self,
        contract_id: &str,
        side: TradeSide,
        qty: f64,
        price: f64,
        isolated_margin_x6: i64,
    ) -> Result<OrderResult, OrderError> {
        self.submit_order(contract_id, side, qty, price, "Alo", isolated_margin_x6).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), OrderError> {
        let (asset_idx, oid) = parse_order_id(order_id)?;
        let nonce = crate::market_data::now_ms();
        let (sig, action_json) = crate::signing::sign_cancel_action(&self.private_key, asset_idx, oid, nonce)
            .await
            .map_err(|e| OrderError::InvalidOrder(e.to_string()))?;
        let result = self.post_exchange(action_json, nonce, sig, None).await?;
        if result["status"].as_str() == Some("err") {
            return Err(OrderError::InvalidOrder(result["response"].to_string()));
        }
        Ok(())
    }

    async fn wait_for_fill(&self, order_id: &str, timeout_seconds: u64) -> Result<FillInfo, OrderError> {
        let (_asset_idx, oid) = parse_order_id(order_id)?;
        let deadline = Instant::now() + Duration::from_secs(timeout_seconds);

        loop {
            let payload = serde_json::json!({ "type": "orderStatus", "user": self.account_address, "oid": oid });
            let data = self.post_info(payload).await?;
            if let Some(order) = data.get("order") {
                match order["status"].as_str().unwrap_or("") {
                    "filled" => {
                        let filled_size = order["order"]["origSz"].as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                        let avg_price = order["order"]["limitPx"].as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                        return Ok(FillInfo { status: FillStatus::Filled, filled_size, avg_price });
                    }
                    "canceled" => return Ok(FillInfo { status: FillStatus::Cancelled, filled_size: 0.0, avg_price: 0.0 }),
                    _ => {}
                }
            }
            if Instant::now() >= deadline {
                return Ok(FillInfo { status: FillStatus::TimedOut, filled_size: 0.0, avg_price: 0.0 });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn get_account_positions(&self) -> Result<HashMap<String, f64>, OrderError> {
        if let Some((positions, ts)) = &*self.cached_positions.lock().unwrap() {
            if ts.elapsed() < CACHE_DURATION {
                return Ok(positions.clone());
            }
        }
        let payload = serde_json::json!({ "type": "clearinghouseState", "user": self.account_address });
        let data = self.post_info(payload).await?;
        let mut positions = HashMap::new();
        if let Some(list) = data["assetPositions"].as_array() {
            for p in list {
                let pos = &p["position"];
                let coin = pos["coin"].as_str().unwrap_or("").to_string();
                let sz = pos["szi"].as_str().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                if coin.is_empty() {
                    continue;
                }
                positions.insert(coin, sz);
            }
        }
        *self.cached_positions.lock().unwrap() = Some((positions.clone(), Instant::now()));
        Ok(positions)
    }

    async fn get_funding_rate(&self, contract_id: &str) -> Result<f64, OrderError> {
        if let Some((rate, ts)) = self.cached_funding.lock().unwrap().get(contract_id) {
            if ts.elapsed() < Duration::from_secs(60) {
                return Ok(*rate);
            }
        }
        let payload = serde_json::json!({ "type": "metaAndAssetCtxs" });
        let data = self.post_info(payload).await?;
        let asset_idx = self.resolve_asset(contract_id)?;
        let rate = data
            .get(1)
            .and_then(|ctxs| ctxs.get(asset_idx as usize))
            .and_then(|ctx| ctx["funding"].as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .map(|hourly| hourly * 24.0 * 365.0)
            .unwrap_or(0.01);
        self.cached_funding.lock().unwrap().insert(contract_id.to_string(), (rate, Instant::now()));
        Ok(rate)
    }
}

fn parse_order_id(order_id: &str) -> Result<(u32, u64), OrderError> {
    let (asset, oid) = order_id
        .split_once(':')
        .ok_or_else(|| OrderError::InvalidOrder(format!("malformed order id: {}", order_id)))?;
    let asset_idx: u32 = asset.parse().map_err(|_| OrderError::InvalidOrder(format!("bad asset idx in {}", order_id)))?;
    let oid: u64 = oid.parse().map_err(|_| OrderError::InvalidOrder(format!("bad oid in {}", order_id)))?;
    Ok((asset_idx, oid))
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn round_to_5_sig_figs(val: f64) -> f64 {
    if val == 0.0 {
        return 0.0;
    }
    let d = 5 - 1 - (val.abs().log10().floor() as i32);
    let d = d.clamp(0, 10);
    let factor = 10_f64.powi(d);
    (val * factor).round() / factor
}

pub fn round_f64(val: f64, decimals: usize) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (val * factor).round() / factor
}

/// Matches the Python SDK's `float_to_wire`: round to 8 decimals, then strip
/// trailing zeros.
pub fn float_to_wire(x: f64) -> String {
    let rounded = format!("{:.8}", x);
    if rounded.contains('.') {
        let trimmed = rounded.trim_end_matches('0');
        trimmed.trim_end_matches('.').to_string()
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::DepthLevel;

    #[tokio::test]
    async fn sim_ioc_buy_increases_position() {
        let sim = SimExchange::new();
        sim.place_ioc_order("ETH", TradeSide::Buy, 0.06, 3000.0, 1000).await.unwrap();
        assert!((sim.position("ETH") - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sim_ioc_sell_decreases_position() {
        let sim = SimExchange::new();
        sim.place_ioc_order("SOL", TradeSide::Sell, 1.0, 200.0, 1000).await.unwrap();
        assert!((sim.position("SOL") - (-1.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sim_fetch_bbo_returns_seeded_values() {
        let sim = SimExchange::new();
        sim.set_bbo("ETH", 3000.0, 3000.9);
        let (bid, ask) = sim.fetch_bbo_prices("ETH").await.unwrap();
        assert_eq!(bid, 3000.0);
        assert_eq!(ask, 3000.9);
    }

    #[tokio::test]
    async fn sim_depth_round_trips() {
        let sim = SimExchange::new();
        let book = OrderBookSnapshot {
            bids: vec![DepthLevel { price: 2999.0, size: 5.0 }],
            asks: vec![DepthLevel { price: 3001.0, size: 5.0 }],
        };
        sim.set_depth("ETH", book);
        assert!(sim.get_bookdepth_handler("ETH").await.is_some());
        assert!(sim.get_bookdepth_handler("SOL").await.is_none());
    }

    #[test]
    fn float_to_wire_strips_trailing_zeros() {
        assert_eq!(float_to_wire(3000.10000000), "3000.1");
        assert_eq!(float_to_wire(100.0), "100");
    }

    #[test]
    fn order_id_round_trips_through_parse() {
        let id = "5:1234";
        let (asset, oid) = parse_order_id(id).unwrap();
        assert_eq!(asset, 5);
        assert_eq!(oid, 1234);
    }
}
