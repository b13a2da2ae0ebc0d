// Core modules
pub mod config;
pub mod decimal;
pub mod execution;
pub mod models;
pub mod risk;

// Re-export commonly used types
pub use config::BotConfig;
pub use decimal::{DecimalError, FixedDecimal};
pub use execution::{ExecutionCoordinator, Position, TradeEvent};
pub use models::*;
pub use risk::{RiskConfig, RiskManager, SharedRiskManager};
