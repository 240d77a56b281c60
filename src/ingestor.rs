// ingestor.rs — Market-Data Streaming Ingestor + Network Stall Panic
//
// Grounded on the teacher's ingestor.rs: the same WS URL constant, the same
// exponential-backoff reconnect loop (1s -> 32s cap), and the same
// stall-watcher-as-sibling-task pattern. Trimmed to what this engine needs:
// two legs' `l2Book` channels feeding a `MarketDataView` instead of the
// teacher's whole-universe `l2Book` + `trades` + `userFills` harvest.
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::market_data::{DepthLevel, MarketDataView, OrderBookSnapshot};

const WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// If no WS message arrives for this long, the feed is declared stalled.
pub const STALL_TIMEOUT_SECS: u64 = 30;

pub type StallPanicFlag = Arc<AtomicBool>;

pub fn new_stall_panic_flag() -> StallPanicFlag {
    Arc::new(AtomicBool::new(false))
}

fn parse_levels(side: &serde_json::Value) -> Vec<DepthLevel> {
    side.as_array()
        .map(|levels| {
            levels
                .iter()
                .filter_map(|l| {
                    let price = l["px"].as_str()?.parse::<f64>().ok()?;
                    let size = l["sz"].as_str()?.parse::<f64>().ok()?;
                    Some(DepthLevel { price, size })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parses one `l2Book` push into `(coin, OrderBookSnapshot)`.
fn parse_l2_book(data: &serde_json::Value) -> Option<(String, OrderBookSnapshot)> {
    let coin = data["coin"].as_str()?.to_string();
    let levels = data["levels"].as_array()?;
    let bids = levels.first().map(parse_levels).unwrap_or_default();
    let asks = levels.get(1).map(parse_levels).unwrap_or_default();
    Some((coin, OrderBookSnapshot { bids, asks }))
}

/// Connects to the exchange's public WS, subscribes to `l2Book` for both
/// configured contracts, and writes every snapshot into `view`. Reconnects
/// forever with exponential backoff; `stall_panic` is cleared on every
/// successful (re)connect and left for the sibling stall-watcher task (see
/// `spawn_stall_watcher`) to set.
pub async fn connect_and_listen(
    contract_ids: Vec<String>,
    view: Arc<MarketDataView>,
    stall_panic: StallPanicFlag,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut retry_delay_secs: u64 = 1;
    let max_delay_secs: u64 = 32;

    loop {
        info!("[INGESTOR] connecting to {}", WS_URL);
        match connect_async(Url::parse(WS_URL)?).await {
            Ok((ws_stream, _)) => {
                info!("[INGESTOR] connected");
                retry_delay_secs = 1;
                stall_panic.store(false, Ordering::SeqCst);
                view.touch();

                let (mut write, mut read) = ws_stream.split();

                for contract_id in &contract_ids {
                    let sub = serde_json::json!({
                        "method": "subscribe",
                        "subscription": { "type": "l2Book", "coin": contract_id }
                    });
                    if let Err(e) = write.send(Message::Text(sub.to_string())).await {
                        error!("[INGESTOR] failed to subscribe to l2Book for {}: {}", contract_id, e);
                    }
                }

                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                                match parsed["channel"].as_str().unwrap_or("") {
                                    "l2Book" => {
                                        if let Some(data) = parsed.get("data") {
                                            if let Some((coin, book)) = parse_l2_book(data) {
                                                view.update_depth(&coin, book);
                                            }
                                        }
                                    }
                                    "ping" | "pong" => view.touch(),
                                    _ => {}
                                }
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = write.send(Message::Pong(data)).await;
                            view.touch();
                        }
                        Ok(Message::Close(_)) => {
                            warn!("[INGESTOR] WS closed by server, reconnecting");
                            break;
                        }
                        Err(e) => {
                            error!("[INGESTOR] WS error: {}, reconnecting", e);
                            break;
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => {
                error!("[INGESTOR] connect failed: {}, retrying in {}s", e, retry_delay_secs);
            }
        }

        tokio::time::sleep(tokio::time::Duration::from_secs(retry_delay_secs)).await;
        retry_delay_secs = std::cmp::min(retry_delay_secs * 2, max_delay_secs);
    }
}

/// Sibling task to `connect_and_listen`: polls `view.is_stalled` every 5s and
/// flips `stall_panic` accordingly, mirroring the teacher's stall-watcher
/// loop in `ingestor::connect_and_listen`.
pub fn spawn_stall_watcher(view: Arc<MarketDataView>, stall_panic: StallPanicFlag) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            let stalled = view.is_stalled(STALL_TIMEOUT_SECS);
            let was = stall_panic.load(Ordering::SeqCst);
            if stalled && !was {
                error!("[INGESTOR] no WS message for >{}s, halting new cycles", STALL_TIMEOUT_SECS);
                stall_panic.store(true, Ordering::SeqCst);
            } else if !stalled && was {
                info!("[INGESTOR] feed recovered");
                stall_panic.store(false, Ordering::SeqCst);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_l2book_payload_into_snapshot() {
        let data = serde_json::json!({
            "coin": "ETH",
            "levels": [
                [{"px": "3000.0", "sz": "1.5", "n": 2}],
                [{"px": "3000.9", "sz": "2.0", "n": 1}],
            ],
        });
        let (coin, book) = parse_l2_book(&data).unwrap();
        assert_eq!(coin, "ETH");
        assert_eq!(book.bids[0].price, 3000.0);
        assert_eq!(book.asks[0].price, 3000.9);
    }

    #[test]
    fn missing_coin_is_rejected() {
        let data = serde_json::json!({ "levels": [[], []] });
        assert!(parse_l2_book(&data).is_none());
    }
}
