use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::FixedDecimal;

/// Trading signal produced by the (external) signal generator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Trade direction used for stop placement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Long,
    Short,
}

/// One evaluation tick: close price and ATR for a symbol plus the signal
/// computed from them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub signal: Signal,
    pub price: FixedDecimal,
    pub atr: FixedDecimal,
    pub timestamp: DateTime<Utc>,
}
