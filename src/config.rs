// config.rs — Pair configuration, fee model, and env-driven runtime config.
//
// Grounded on main.rs's env-var bootstrap style (MM_HARVEST_TICKS,
// MM_SHADOW_MODE, REDIS_URL). The spec's illustrative CLI surface is
// implemented as environment variables rather than a dedicated argument
// parser — see DESIGN.md for the Open Question this resolves.
use serde::{Deserialize, Serialize};

/// Static configuration for one leg of the pair. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegConfig {
    pub ticker: String,
    pub contract_id: String,
    /// Minimum price/quantity increment for this leg's contract.
    pub tick_size: f64,
    /// Declarative leverage; affects isolated margin sizing and funding PnL only.
    pub leverage: f64,
}

/// Immutable pair configuration for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub leg_a: LegConfig,
    pub leg_b: LegConfig,
    /// Shared USD notional target for the whole pair (split in half per leg
    /// when legs are symmetric).
    pub notional_usd: f64,
    /// When true, swap which leg is bought vs sold in each cycle.
    pub reverse_direction: bool,
}

impl PairConfig {
    /// Per-leg target notional, assuming symmetric legs.
    pub fn per_leg_notional(&self) -> f64 {
        self.notional_usd / 2.0
    }

    /// Returns (buy_leg, sell_leg) for the current direction.
    pub fn buy_sell_legs(&self) -> (&LegConfig, &LegConfig) {
        if self.reverse_direction {
            (&self.leg_b, &self.leg_a)
        } else {
            (&self.leg_a, &self.leg_b)
        }
    }
}

/// Fee model, expressed in basis points of notional. Immutable per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeConfig {
    pub taker_bps: f64,
    pub maker_bps: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self { taker_bps: 5.0, maker_bps: 2.0 }
    }
}

/// Runtime thresholds and toggles, all overridable via environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub iterations: u64, // 0 = unbounded
    pub min_spread_bps: f64,
    pub max_slippage_bps: f64,
    pub use_post_only_entry: bool,
    pub post_only_timeout_s: u64,
    pub monitor_exit_timing: bool,
    pub min_profit_bps: f64,
    pub loss_limit_bps: f64,
    pub monitor_timeout_s: u64,
    pub spread_wait_timeout_s: u64,
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iterations: 0,
            min_spread_bps: 20.0,
            max_slippage_bps: 10.0,
            use_post_only_entry: false,
            post_only_timeout_s: 5,
            monitor_exit_timing: false,
            min_profit_bps: 10.0,
            loss_limit_bps: -30.0,
            monitor_timeout_s: 60,
            spread_wait_timeout_s: 30,
            dry_run: false,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl PairConfig {
    /// Loads pair configuration from `ENGINE_*` environment variables.
    pub fn from_env() -> Self {
        let leverage = env_f64("ENGINE_LEVERAGE", 3.0);
        Self {
            leg_a: LegConfig {
                ticker: env_string("ENGINE_LEG_A_TICKER", "ETH"),
                contract_id: env_string("ENGINE_LEG_A_CONTRACT", "ETH"),
                tick_size: env_f64("ENGINE_LEG_A_TICK_SIZE", 0.01),
                leverage,
            },
            leg_b: LegConfig {
                ticker: env_string("ENGINE_LEG_B_TICKER", "SOL"),
                contract_id: env_string("ENGINE_LEG_B_CONTRACT", "SOL"),
                tick_size: env_f64("ENGINE_LEG_B_TICK_SIZE", 0.01),
                leverage,
            },
            notional_usd: env_f64("ENGINE_NOTIONAL_USD", 400.0),
            reverse_direction: env_bool("ENGINE_REVERSE_DIRECTION", false),
        }
    }
}

impl FeeConfig {
    pub fn from_env() -> Self {
        Self {
            taker_bps: env_f64("ENGINE_TAKER_FEE_BPS", 5.0),
            maker_bps: env_f64("ENGINE_MAKER_FEE_BPS", 2.0),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            iterations: env_u64("ENGINE_ITERATIONS", defaults.iterations),
            min_spread_bps: env_f64("ENGINE_MIN_SPREAD_BPS", defaults.min_spread_bps),
            max_slippage_bps: env_f64("ENGINE_MAX_SLIPPAGE_BPS", defaults.max_slippage_bps),
            use_post_only_entry: env_bool("ENGINE_USE_POST_ONLY_ENTRY", defaults.use_post_only_entry),
            post_only_timeout_s: env_u64("ENGINE_POST_ONLY_TIMEOUT_S", defaults.post_only_timeout_s),
            monitor_exit_timing: env_bool("ENGINE_MONITOR_EXIT_TIMING", defaults.monitor_exit_timing),
            min_profit_bps: env_f64("ENGINE_MIN_PROFIT_BPS", defaults.min_profit_bps),
            loss_limit_bps: env_f64("ENGINE_LOSS_LIMIT_BPS", defaults.loss_limit_bps),
            monitor_timeout_s: env_u64("ENGINE_MONITOR_TIMEOUT_S", defaults.monitor_timeout_s),
            spread_wait_timeout_s: env_u64("ENGINE_SPREAD_WAIT_TIMEOUT_S", defaults.spread_wait_timeout_s),
            dry_run: env_bool("ENGINE_DRY_RUN", defaults.dry_run),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_leg_notional_splits_evenly() {
        let cfg = PairConfig {
            leg_a: LegConfig { ticker: "ETH".into(), contract_id: "ETH".into(), tick_size: 0.01, leverage: 3.0 },
            leg_b: LegConfig { ticker: "SOL".into(), contract_id: "SOL".into(), tick_size: 0.01, leverage: 3.0 },
            notional_usd: 400.0,
            reverse_direction: false,
        };
        assert_eq!(cfg.per_leg_notional(), 200.0);
    }

    #[test]
    fn reverse_direction_swaps_buy_sell() {
        let mut cfg = PairConfig {
            leg_a: LegConfig { ticker: "ETH".into(), contract_id: "ETH".into(), tick_size: 0.01, leverage: 3.0 },
            leg_b: LegConfig { ticker: "SOL".into(), contract_id: "SOL".into(), tick_size: 0.01, leverage: 3.0 },
            notional_usd: 400.0,
            reverse_direction: false,
        };
        let (buy, sell) = cfg.buy_sell_legs();
        assert_eq!(buy.ticker, "ETH");
        assert_eq!(sell.ticker, "SOL");

        cfg.reverse_direction = true;
        let (buy, sell) = cfg.buy_sell_legs();
        assert_eq!(buy.ticker, "SOL");
        assert_eq!(sell.ticker, "ETH");
    }
}
