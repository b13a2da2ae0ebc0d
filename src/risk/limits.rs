use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::FixedDecimal;

/// Risk parameters. Fractions are of account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub risk_per_trade: FixedDecimal,
    pub max_position_size: FixedDecimal,
    pub max_daily_loss: FixedDecimal,
    pub max_trades: u32,
    pub atr_sl_mult: FixedDecimal,
    pub atr_tp_mult: FixedDecimal,
    pub atr_trail_mult: FixedDecimal,
    pub min_trade_amount: FixedDecimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: dec!(0.01).into(),    // 1% of balance at risk
            max_position_size: dec!(0.1).into(),  // 10% of balance per position
            max_daily_loss: dec!(0.02).into(),    // -2% daily
            max_trades: 10,                       // Max 10 trades per day
            atr_sl_mult: dec!(1.5).into(),
            atr_tp_mult: dec!(3.0).into(),
            atr_trail_mult: dec!(2.0).into(),
            min_trade_amount: dec!(10).into(),    // USDT
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskConfigError {
    #[error("{name} must be in (0, 1], got {value}")]
    FractionOutOfRange {
        name: &'static str,
        value: FixedDecimal,
    },
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        name: &'static str,
        value: FixedDecimal,
    },
    #[error("stop-loss multiplier {stop} must be below take-profit multiplier {take}")]
    InvertedRewardRatio {
        stop: FixedDecimal,
        take: FixedDecimal,
    },
    #[error("max_trades must be at least 1")]
    NoTradesAllowed,
}

/// Which daily limit stopped new entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LimitBreach {
    DailyLoss,
    TradeCount,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskConfigError> {
        for (name, value) in [
            ("risk_per_trade", self.risk_per_trade),
            ("max_position_size", self.max_position_size),
            ("max_daily_loss", self.max_daily_loss),
        ] {
            if !value.is_positive() || value > FixedDecimal::ONE {
                return Err(RiskConfigError::FractionOutOfRange { name, value });
            }
        }

        for (name, value) in [
            ("atr_sl_mult", self.atr_sl_mult),
            ("atr_tp_mult", self.atr_tp_mult),
            ("atr_trail_mult", self.atr_trail_mult),
        ] {
            if !value.is_positive() {
                return Err(RiskConfigError::NonPositive { name, value });
            }
        }

        if self.min_trade_amount.is_negative() {
            return Err(RiskConfigError::NonPositive {
                name: "min_trade_amount",
                value: self.min_trade_amount,
            });
        }

        if self.atr_sl_mult >= self.atr_tp_mult {
            return Err(RiskConfigError::InvertedRewardRatio {
                stop: self.atr_sl_mult,
                take: self.atr_tp_mult,
            });
        }

        if self.max_trades == 0 {
            return Err(RiskConfigError::NoTradesAllowed);
        }

        Ok(())
    }

    /// Daily limits against `initial_balance`
    pub fn check(
        &self,
        daily_pnl: FixedDecimal,
        daily_trades: u32,
        initial_balance: FixedDecimal,
    ) -> Result<(), LimitBreach> {
        let max_loss = initial_balance * self.max_daily_loss;
        if daily_pnl <= -max_loss {
            return Err(LimitBreach::DailyLoss);
        }

        if daily_trades >= self.max_trades {
            return Err(LimitBreach::TradeCount);
        }

        Ok(())
    }
}

/// Per-day counters, reset lazily on the first check of a new date.
///
/// `last_reset` is `None` until the first date is seen; that date becomes
/// the current day without a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub daily_pnl: FixedDecimal,
    pub daily_trades: u32,
    pub last_reset: Option<NaiveDate>,
}

impl DailyStats {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            last_reset: Some(today),
            ..Self::unstarted()
        }
    }

    pub fn unstarted() -> Self {
        Self {
            daily_pnl: FixedDecimal::ZERO,
            daily_trades: 0,
            last_reset: None,
        }
    }

    /// Reset if `today` is a later date. Returns whether a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        match self.last_reset {
            Some(last) if today <= last => false,
            Some(_) => {
                *self = Self::new(today);
                true
            }
            None => {
                self.last_reset = Some(today);
                false
            }
        }
    }

    pub fn record_trade(&mut self, pnl: FixedDecimal) {
        self.daily_pnl += pnl;
        self.daily_trades += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd(text: &str) -> FixedDecimal {
        FixedDecimal::of(text).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RiskConfig {
            max_daily_loss: fd("1.5"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RiskConfigError::FractionOutOfRange { name: "max_daily_loss", .. })
        ));

        let config = RiskConfig {
            atr_sl_mult: fd("3"),
            atr_tp_mult: fd("1.5"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RiskConfigError::InvertedRewardRatio { .. })
        ));

        let config = RiskConfig {
            atr_trail_mult: FixedDecimal::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RiskConfigError::NonPositive { name: "atr_trail_mult", .. })
        ));

        let config = RiskConfig {
            max_trades: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(RiskConfigError::NoTradesAllowed));
    }

    #[test]
    fn test_check_daily_loss() {
        let config = RiskConfig::default();
        let balance = fd("1000");

        // -2% of 1000 = -20
        assert!(config.check(fd("-19.99999999"), 0, balance).is_ok());
        assert_eq!(config.check(fd("-20"), 0, balance), Err(LimitBreach::DailyLoss));
        assert_eq!(config.check(fd("-35"), 0, balance), Err(LimitBreach::DailyLoss));
    }

    #[test]
    fn test_check_trade_count() {
        let config = RiskConfig::default();
        assert!(config.check(FixedDecimal::ZERO, 9, fd("1000")).is_ok());
        assert_eq!(
            config.check(FixedDecimal::ZERO, 10, fd("1000")),
            Err(LimitBreach::TradeCount)
        );
    }

    #[test]
    fn test_roll_over_once_per_date() {
        let mut stats = DailyStats::new(day(1));
        stats.record_trade(fd("-5"));
        stats.record_trade(fd("2"));
        assert_eq!(stats.daily_trades, 2);
        assert_eq!(stats.daily_pnl, fd("-3"));

        assert!(!stats.roll_over(day(1)));
        assert_eq!(stats.daily_trades, 2);

        assert!(stats.roll_over(day(2)));
        assert_eq!(stats.daily_trades, 0);
        assert_eq!(stats.daily_pnl, FixedDecimal::ZERO);
        assert_eq!(stats.last_reset, Some(day(2)));

        stats.record_trade(fd("1"));
        assert!(!stats.roll_over(day(2)));
        // A clock stepping backwards never resets
        assert!(!stats.roll_over(day(1)));
        assert_eq!(stats.daily_trades, 1);
    }

    #[test]
    fn test_unstarted_stats_adopt_first_date() {
        let mut stats = DailyStats::unstarted();
        assert_eq!(stats.last_reset, None);

        // a historical date starts the first day, it does not reset it
        assert!(!stats.roll_over(day(1)));
        assert_eq!(stats.last_reset, Some(day(1)));
        stats.record_trade(fd("-4"));

        assert!(!stats.roll_over(day(1)));
        assert_eq!(stats.daily_trades, 1);

        assert!(stats.roll_over(day(2)));
        assert_eq!(stats.daily_trades, 0);
        assert_eq!(stats.last_reset, Some(day(2)));
    }

    #[test]
    fn test_config_from_json_accepts_numbers_and_strings() {
        let config: RiskConfig =
            serde_json::from_str(r#"{"max_position_size": 0.25, "atr_sl_mult": "1.0", "max_trades": 4}"#)
                .unwrap();

        assert_eq!(config.max_position_size, fd("0.25"));
        assert_eq!(config.atr_sl_mult, fd("1"));
        assert_eq!(config.max_trades, 4);
        assert_eq!(config.atr_tp_mult, fd("3"));
    }
}
