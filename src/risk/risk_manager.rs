use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::decimal::{DecimalError, FixedDecimal, IntoFixed};
use crate::execution::Position;
use crate::models::Direction;
use crate::risk::limits::{DailyStats, LimitBreach, RiskConfig};

/// Daily counters are aggregated across symbols, so workers share one manager
pub type SharedRiskManager = Arc<Mutex<RiskManager>>;

/// Stop-loss, take-profit and trailing activation for a new entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopLevels {
    pub stop_loss: FixedDecimal,
    pub take_profit: FixedDecimal,
    pub trailing_activation: FixedDecimal,
    /// ATR after the minimum-volatility floor
    pub atr: FixedDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeDecision {
    Hold,
    StopLoss,
    TakeProfit,
}

pub struct RiskManager {
    config: RiskConfig,
    account_balance: FixedDecimal,
    volatility_adjustment: FixedDecimal,
    daily: DailyStats,
}

impl RiskManager {
    pub fn new(account_balance: FixedDecimal, config: RiskConfig) -> Self {
        Self::starting_on(account_balance, config, Utc::now().date_naive())
    }

    /// Create a manager whose daily counters start on `today`
    pub fn starting_on(account_balance: FixedDecimal, config: RiskConfig, today: NaiveDate) -> Self {
        Self::with_daily(account_balance, config, DailyStats::new(today))
    }

    /// Create a manager whose daily counters start on the first date it is
    /// asked about, so recorded history replays with correct rollovers
    pub fn unstarted(account_balance: FixedDecimal, config: RiskConfig) -> Self {
        Self::with_daily(account_balance, config, DailyStats::unstarted())
    }

    fn with_daily(account_balance: FixedDecimal, config: RiskConfig, daily: DailyStats) -> Self {
        Self {
            config,
            account_balance,
            volatility_adjustment: FixedDecimal::ONE,
            daily,
        }
    }

    pub fn shared(self) -> SharedRiskManager {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn account_balance(&self) -> FixedDecimal {
        self.account_balance
    }

    pub fn set_account_balance(&mut self, balance: FixedDecimal) {
        self.account_balance = balance;
    }

    pub fn volatility_adjustment(&self) -> FixedDecimal {
        self.volatility_adjustment
    }

    pub fn daily_pnl(&self) -> FixedDecimal {
        self.daily.daily_pnl
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily.daily_trades
    }

    pub fn last_reset_date(&self) -> Option<NaiveDate> {
        self.daily.last_reset
    }

    /// Notional (USDT) to commit to a new entry; zero means "do not trade".
    ///
    /// Size shrinks as ATR grows relative to price and is capped at
    /// `max_position_size` of `balance`.
    pub fn compute_position_size<B, P, A>(&self, balance: B, price: P, atr: A) -> Result<FixedDecimal, DecimalError>
    where
        B: IntoFixed,
        P: IntoFixed,
        A: IntoFixed,
    {
        let balance = FixedDecimal::of(balance)?;
        let price = FixedDecimal::of(price)?;
        let atr = FixedDecimal::of(atr)?;

        if !price.is_positive() {
            tracing::warn!("Cannot size a position at non-positive price {}", price);
            return Ok(FixedDecimal::ZERO);
        }

        let max_position = balance * self.config.max_position_size;
        if !max_position.is_positive() {
            return Ok(FixedDecimal::ZERO);
        }

        let volatility = self.effective_atr(price, atr).checked_div(price)?;
        let vol_adj = (FixedDecimal::ONE - volatility * FixedDecimal::from(dec!(5)))
            .clamp(FixedDecimal::from(dec!(0.2)), FixedDecimal::ONE);

        let position_size =
            (max_position * vol_adj * self.volatility_adjustment).clamp(FixedDecimal::ZERO, max_position);

        if position_size < self.config.min_trade_amount {
            tracing::debug!(
                "Position size {:.2} below minimum {:.2}",
                position_size,
                self.config.min_trade_amount
            );
            return Ok(FixedDecimal::ZERO);
        }

        Ok(position_size)
    }

    /// Size so that hitting `stop_loss` loses `risk_per_trade` of the account,
    /// fees both ways included. Capped at 95% of the account.
    pub fn risk_based_position_size<P, S, F>(
        &self,
        entry_price: P,
        stop_loss: S,
        fee_rate: F,
    ) -> Result<FixedDecimal, DecimalError>
    where
        P: IntoFixed,
        S: IntoFixed,
        F: IntoFixed,
    {
        let entry_price = FixedDecimal::of(entry_price)?;
        let stop_loss = FixedDecimal::of(stop_loss)?;
        let fee_rate = FixedDecimal::of(fee_rate)?;

        if !entry_price.is_positive() {
            return Err(DecimalError::DivisionByZero);
        }

        let risk_amount = self
            .account_balance
            .checked_mul(self.config.risk_per_trade)?
            .checked_mul(self.volatility_adjustment)?;
        let price_risk = entry_price.checked_sub(stop_loss)?.abs().checked_div(entry_price)?;
        let fee_impact = fee_rate.checked_mul(FixedDecimal::from(dec!(2)))?;
        let position_size = risk_amount.checked_div(price_risk.checked_add(fee_impact)?)?;

        let max_position = self.account_balance * FixedDecimal::from(dec!(0.95));
        Ok(position_size.min(max_position))
    }

    pub fn calculate_stop_levels<P, A>(
        &self,
        entry_price: P,
        atr: A,
        direction: Direction,
    ) -> Result<StopLevels, DecimalError>
    where
        P: IntoFixed,
        A: IntoFixed,
    {
        let entry = FixedDecimal::of(entry_price)?;
        let atr = self.effective_atr(entry, FixedDecimal::of(atr)?);

        let stop_distance = atr.checked_mul(self.config.atr_sl_mult)?;
        let target_distance = atr.checked_mul(self.config.atr_tp_mult)?;
        let activation_distance = atr.checked_mul(self.config.atr_trail_mult)?;

        let levels = match direction {
            Direction::Long => StopLevels {
                stop_loss: entry.checked_sub(stop_distance)?,
                take_profit: entry.checked_add(target_distance)?,
                trailing_activation: entry.checked_add(activation_distance)?,
                atr,
            },
            Direction::Short => StopLevels {
                stop_loss: entry.checked_add(stop_distance)?,
                take_profit: entry.checked_sub(target_distance)?,
                trailing_activation: entry.checked_sub(activation_distance)?,
                atr,
            },
        };

        Ok(levels)
    }

    /// Stop the position should carry at `current_price`.
    ///
    /// Before activation this is the existing stop. Afterwards it is
    /// `price - atr_trail_mult * atr`, but never below the existing stop.
    pub fn update_trailing_stop<P: IntoFixed>(
        &self,
        position: &Position,
        current_price: P,
    ) -> Result<Option<FixedDecimal>, DecimalError> {
        let current_price = FixedDecimal::of(current_price)?;

        let Some(activation) = position.trailing_activation() else {
            return Ok(position.current_stop());
        };
        if current_price < activation {
            return Ok(position.current_stop());
        }

        let candidate = current_price - position.atr() * self.config.atr_trail_mult;
        let new_stop = match position.current_stop() {
            Some(stop) => stop.max(candidate),
            None => candidate,
        };

        Ok(Some(new_stop))
    }

    /// Exit check against the current (possibly trailed) stop
    pub fn evaluate_trade<P: IntoFixed>(
        &self,
        position: &Position,
        current_price: P,
    ) -> Result<TradeDecision, DecimalError> {
        let current_price = FixedDecimal::of(current_price)?;

        if position.current_stop().is_some_and(|stop| current_price <= stop) {
            return Ok(TradeDecision::StopLoss);
        }

        if position.take_profit().is_some_and(|tp| current_price >= tp) {
            return Ok(TradeDecision::TakeProfit);
        }

        Ok(TradeDecision::Hold)
    }

    /// Whether a new trade may open today
    pub fn can_trade<D, B>(&mut self, daily_pnl: D, initial_balance: B) -> Result<bool, DecimalError>
    where
        D: IntoFixed,
        B: IntoFixed,
    {
        self.can_trade_on(Utc::now().date_naive(), daily_pnl, initial_balance)
    }

    /// [`RiskManager::can_trade`] with an explicit calendar date
    pub fn can_trade_on<D, B>(
        &mut self,
        today: NaiveDate,
        daily_pnl: D,
        initial_balance: B,
    ) -> Result<bool, DecimalError>
    where
        D: IntoFixed,
        B: IntoFixed,
    {
        let daily_pnl = FixedDecimal::of(daily_pnl)?;
        let initial_balance = FixedDecimal::of(initial_balance)?;

        self.roll_over(today);

        Ok(self
            .config
            .check(daily_pnl, self.daily.daily_trades, initial_balance)
            .is_ok())
    }

    /// Roll the day over, then check limits against the tracked daily P&L
    pub fn check_limits_on(&mut self, today: NaiveDate, initial_balance: FixedDecimal) -> Result<(), LimitBreach> {
        self.roll_over(today);
        self.config
            .check(self.daily.daily_pnl, self.daily.daily_trades, initial_balance)
    }

    /// Reset daily counters if `today` is a new date
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        let previous = self.daily.last_reset;
        let reset = self.daily.roll_over(today);
        if let (true, Some(previous)) = (reset, previous) {
            tracing::debug!("Daily risk counters reset ({} -> {})", previous, today);
        }
        reset
    }

    /// Book a completed trade into today's statistics
    pub fn record_trade(&mut self, pnl: FixedDecimal) {
        self.daily.record_trade(pnl);
    }

    /// Book realized P&L without counting a trade (partial exits)
    pub fn record_pnl(&mut self, pnl: FixedDecimal) {
        self.daily.daily_pnl += pnl;
    }

    /// Scale future sizing by `baseline / current` volatility, kept in [0.5, 1.5].
    ///
    /// A non-positive baseline resets to neutral.
    pub fn adjust_for_volatility<C, B>(
        &mut self,
        current_volatility: C,
        baseline_volatility: B,
    ) -> Result<FixedDecimal, DecimalError>
    where
        C: IntoFixed,
        B: IntoFixed,
    {
        let current = FixedDecimal::of(current_volatility)?;
        let baseline = FixedDecimal::of(baseline_volatility)?;

        if !baseline.is_positive() {
            self.volatility_adjustment = FixedDecimal::ONE;
            return Ok(self.volatility_adjustment);
        }

        let ratio = baseline.checked_div(current)?;
        self.volatility_adjustment = ratio.clamp(FixedDecimal::from(dec!(0.5)), FixedDecimal::from(dec!(1.5)));

        Ok(self.volatility_adjustment)
    }

    // 1% of price, so a near-zero ATR cannot blow up sizing or collapse stops
    fn effective_atr(&self, price: FixedDecimal, atr: FixedDecimal) -> FixedDecimal {
        atr.max(price * FixedDecimal::from(dec!(0.01)))
    }
}
