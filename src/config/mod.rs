use std::path::Path;

use anyhow::Context;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::FixedDecimal;
use crate::risk::RiskConfig;

const ENV_PREFIX: &str = "SPOTGUARD";

/// Session settings for the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Starting cash in USDT; daily loss limits are measured against it
    pub initial_balance: FixedDecimal,
    /// Taker fee charged on both legs
    pub fee_rate: FixedDecimal,
    pub symbols: Vec<String>,
    pub risk: RiskConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(100).into(),
            fee_rate: dec!(0.001).into(),
            symbols: vec!["SOL/USDT".to_string()],
            risk: RiskConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load defaults, then `path` (if any), then `SPOTGUARD__*` variables.
    ///
    /// Nested keys use `__`, e.g. `SPOTGUARD__RISK__MAX_TRADES=4`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("symbols")
                .try_parsing(true),
        );

        let config: BotConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;

        tracing::debug!(
            "Loaded config: balance=${:.2}, fee={}, {} symbols",
            config.initial_balance,
            config.fee_rate,
            config.symbols.len()
        );

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.initial_balance.is_positive(),
            "initial_balance must be positive, got {}",
            self.initial_balance
        );
        anyhow::ensure!(
            // a zero fee lets rounded quantities buy slightly more than the order size
            self.fee_rate.is_positive() && self.fee_rate < FixedDecimal::ONE,
            "fee_rate must be in (0, 1), got {}",
            self.fee_rate
        );
        self.risk.validate()?;
        Ok(())
    }
}
