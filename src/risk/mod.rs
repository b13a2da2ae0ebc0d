// Risk management module
pub mod limits;
pub mod risk_manager;

pub use limits::{DailyStats, LimitBreach, RiskConfig, RiskConfigError};
pub use risk_manager::{RiskManager, SharedRiskManager, StopLevels, TradeDecision};
