// errors.rs — Crate-level error kinds.
//
// Grounded on exchange::OrderError's shape (a flat enum with Display),
// extended to cover the error kinds in spec.md section 7.
use std::fmt;

#[derive(Debug, Clone)]
pub enum EngineError {
    /// Sizing determined the leg's quantity is below the exchange minimum.
    OrderSizeBelowMinimum(String),
    /// BookDepth-derived slippage exceeds the configured ceiling for a leg.
    SlippageExceedsCeiling(String),
    /// BBO is unavailable for a leg and REST fallback also failed.
    BboUnavailable(String),
    /// Exchange rejected an order (includes queue/liquidity filters).
    OrderRejected(String),
    /// Exchange-level network or transport failure.
    NetworkError(String),
    /// Position reconciliation found a residual that emergency unwind could not clear.
    ReconciliationFailed(String),
    /// Unrecoverable condition: auth failure, missing contract metadata, etc.
    Fatal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::OrderSizeBelowMinimum(s) => write!(f, "order size below exchange minimum: {}", s),
            EngineError::SlippageExceedsCeiling(s) => write!(f, "slippage exceeds ceiling: {}", s),
            EngineError::BboUnavailable(s) => write!(f, "BBO unavailable: {}", s),
            EngineError::OrderRejected(s) => write!(f, "order rejected: {}", s),
            EngineError::NetworkError(s) => write!(f, "network error: {}", s),
            EngineError::ReconciliationFailed(s) => write!(f, "reconciliation failed: {}", s),
            EngineError::Fatal(s) => write!(f, "fatal: {}", s),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::exchange::OrderError> for EngineError {
    fn from(e: crate::exchange::OrderError) -> Self {
        use crate::exchange::OrderError as OE;
        match e {
            OE::InsufficientFunds(s) => EngineError::OrderRejected(format!("insufficient funds: {}", s)),
            OE::MaxPositionsReached => EngineError::OrderRejected("max positions reached".into()),
            OE::InvalidOrder(s) => EngineError::OrderRejected(s),
            OE::NetworkError(s) => EngineError::NetworkError(s),
            OE::RateLimited => EngineError::OrderRejected("rate limited".into()),
        }
    }
}
