use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::BotConfig;
use crate::decimal::{DecimalError, FixedDecimal, IntoFixed};
use crate::execution::metrics::{SessionMetrics, TradeRecord};
use crate::execution::position::{CloseError, OpenError, Position};
use crate::models::{Direction, Signal};
use crate::risk::{LimitBreach, RiskManager, SharedRiskManager, TradeDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal, // Sell signal from the strategy
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    DailyLossLimit,
    TradeLimit,
    BelowMinimumSize,
}

impl From<LimitBreach> for RejectReason {
    fn from(breach: LimitBreach) -> Self {
        match breach {
            LimitBreach::DailyLoss => RejectReason::DailyLossLimit,
            LimitBreach::TradeCount => RejectReason::TradeLimit,
        }
    }
}

/// What a tick did to a symbol's book
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    Opened {
        symbol: String,
        size: FixedDecimal,
        entry: FixedDecimal,
        stop: FixedDecimal,
        take_profit: FixedDecimal,
    },
    Reduced {
        symbol: String,
        closed_quantity: FixedDecimal,
        remaining_quantity: FixedDecimal,
        net_value: FixedDecimal,
        pnl: FixedDecimal,
    },
    Closed {
        symbol: String,
        exit: FixedDecimal,
        pnl: FixedDecimal,
        fees: FixedDecimal,
        reason: ExitReason,
    },
    Rejected {
        symbol: String,
        reason: RejectReason,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Decimal(#[from] DecimalError),
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Close(#[from] CloseError),
}

/// Read-only view for reporting
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    pub balance: FixedDecimal,
    pub initial_balance: FixedDecimal,
    pub open_positions: Vec<Position>,
    pub daily_pnl: FixedDecimal,
    pub daily_trades: u32,
    pub max_drawdown: FixedDecimal,
    pub closed_trades: usize,
}

/// Drives positions from the signal stream: at most one open position per
/// symbol, entries gated by the shared risk manager, exits on stop, target
/// or sell signal.
pub struct ExecutionCoordinator {
    risk: SharedRiskManager,
    fee_rate: FixedDecimal,
    initial_balance: FixedDecimal,
    balance: FixedDecimal,
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
    max_balance: FixedDecimal,
    max_drawdown: FixedDecimal,
}

impl ExecutionCoordinator {
    pub fn new(initial_balance: FixedDecimal, fee_rate: FixedDecimal, risk: SharedRiskManager) -> Self {
        Self {
            risk,
            fee_rate,
            initial_balance,
            balance: initial_balance,
            positions: HashMap::new(),
            trades: Vec::new(),
            max_balance: initial_balance,
            max_drawdown: FixedDecimal::ZERO,
        }
    }

    /// Coordinator with its own risk manager built from `config`. The daily
    /// counters start on the first tick's date, live or replayed.
    pub fn from_config(config: &BotConfig) -> Self {
        let risk = RiskManager::unstarted(config.initial_balance, config.risk.clone()).shared();
        Self::new(config.initial_balance, config.fee_rate, risk)
    }

    /// Process one tick (live trading - uses current time)
    pub fn on_tick<P, A>(
        &mut self,
        symbol: &str,
        signal: Signal,
        price: P,
        atr: A,
    ) -> Result<Option<TradeEvent>, ExecutionError>
    where
        P: IntoFixed,
        A: IntoFixed,
    {
        self.on_tick_at(symbol, signal, price, atr, None)
    }

    /// Process one tick with explicit timestamp (for replays)
    pub fn on_tick_at<P, A>(
        &mut self,
        symbol: &str,
        signal: Signal,
        price: P,
        atr: A,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<TradeEvent>, ExecutionError>
    where
        P: IntoFixed,
        A: IntoFixed,
    {
        let price = FixedDecimal::of(price)?;
        let atr = FixedDecimal::of(atr)?;
        let now = timestamp.unwrap_or_else(Utc::now);

        if self.positions.contains_key(symbol) {
            return self.manage_open_position(symbol, signal, price, now);
        }

        match signal {
            Signal::Buy => self.try_open(symbol, price, atr, now).map(Some),
            Signal::Sell | Signal::Hold => Ok(None),
        }
    }

    /// Sell part of an open position (live trading - uses current time)
    pub fn close_partial<P, R>(
        &mut self,
        symbol: &str,
        exit_price: P,
        close_ratio: R,
    ) -> Result<Option<TradeEvent>, ExecutionError>
    where
        P: IntoFixed,
        R: IntoFixed,
    {
        self.close_partial_at(symbol, exit_price, close_ratio, None)
    }

    /// Sell part of an open position with explicit timestamp.
    ///
    /// A ratio that would sell the whole holding once the quantity is
    /// rounded (one, or a slice of a dust position) closes the position as a
    /// manual exit.
    pub fn close_partial_at<P, R>(
        &mut self,
        symbol: &str,
        exit_price: P,
        close_ratio: R,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<TradeEvent>, ExecutionError>
    where
        P: IntoFixed,
        R: IntoFixed,
    {
        let exit_price = FixedDecimal::of(exit_price)?;
        let close_ratio = FixedDecimal::of(close_ratio)?;
        let now = timestamp.unwrap_or_else(Utc::now);

        let Some(position) = self.positions.get_mut(symbol) else {
            return Ok(None);
        };

        // A slice that rounds up to the whole holding closes the position
        let valid_ratio = close_ratio.is_positive() && close_ratio <= FixedDecimal::ONE;
        if valid_ratio && position.quantity().checked_mul(close_ratio)? == position.quantity() {
            return self.close_position(symbol, exit_price, ExitReason::Manual, now);
        }

        let partial = position.close_partial(exit_price, close_ratio)?;
        let pnl = partial.net_value - partial.released_cost;
        self.balance += partial.net_value;

        {
            let mut risk = lock(&self.risk);
            risk.roll_over(now.date_naive());
            risk.record_pnl(pnl);
            risk.set_account_balance(self.balance);
        }

        tracing::info!(
            "Reduced {} by {:.4}: net ${:.2}, P&L ${:.2}, {:.4} left",
            symbol,
            partial.closed_quantity,
            partial.net_value,
            pnl,
            partial.remaining_quantity
        );

        Ok(Some(TradeEvent::Reduced {
            symbol: symbol.to_string(),
            closed_quantity: partial.closed_quantity,
            remaining_quantity: partial.remaining_quantity,
            net_value: partial.net_value,
            pnl,
        }))
    }

    fn try_open(
        &mut self,
        symbol: &str,
        price: FixedDecimal,
        atr: FixedDecimal,
        now: DateTime<Utc>,
    ) -> Result<TradeEvent, ExecutionError> {
        if !price.is_positive() {
            return Err(OpenError::InvalidEntryPrice(price).into());
        }

        let risk = Arc::clone(&self.risk);
        let (size, levels) = {
            let mut risk = lock(&risk);

            if let Err(breach) = risk.check_limits_on(now.date_naive(), self.initial_balance) {
                tracing::info!("Trade rejected for {}: {:?}", symbol, breach);
                return Ok(rejected(symbol, breach.into()));
            }

            risk.set_account_balance(self.balance);
            let levels = risk.calculate_stop_levels(price, atr, Direction::Long)?;

            // Volatility sizing, capped so the stop loses at most risk_per_trade
            let size = risk.compute_position_size(self.balance, price, atr)?;
            let size = match risk.risk_based_position_size(price, levels.stop_loss, self.fee_rate) {
                Ok(cap) => size.min(cap),
                // no distance to the stop and no fees: nothing to cap against
                Err(DecimalError::DivisionByZero) => size,
                Err(e) => return Err(e.into()),
            };

            if size.is_zero() || size < risk.config().min_trade_amount {
                tracing::info!("Trade rejected for {}: position size below minimum", symbol);
                return Ok(rejected(symbol, RejectReason::BelowMinimumSize));
            }

            (size, levels)
        };

        let mut position = Position::open_at(symbol, price, size, self.fee_rate, Some(now))?;
        if !position.is_valid() {
            tracing::info!("Trade rejected for {}: ${:.2} below order minimum", symbol, size);
            return Ok(rejected(symbol, RejectReason::BelowMinimumSize));
        }
        position.apply_stop_levels(&levels);

        self.balance -= position.entry_cost();

        tracing::info!(
            "Opened {} position: Size=${:.2}, Entry=${:.4}, SL=${:.4}, TP=${:.4}",
            symbol,
            size,
            price,
            levels.stop_loss,
            levels.take_profit
        );

        self.positions.insert(symbol.to_string(), position);

        Ok(TradeEvent::Opened {
            symbol: symbol.to_string(),
            size,
            entry: price,
            stop: levels.stop_loss,
            take_profit: levels.take_profit,
        })
    }

    fn manage_open_position(
        &mut self,
        symbol: &str,
        signal: Signal,
        price: FixedDecimal,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutionError> {
        let decision = {
            let risk = lock(&self.risk);
            let Some(position) = self.positions.get_mut(symbol) else {
                return Ok(None);
            };

            if let Some(new_stop) = risk.update_trailing_stop(position, price)? {
                if position.adopt_stop(new_stop) {
                    tracing::debug!("Trailing stop for {} raised to {:.4}", symbol, new_stop);
                }
            }

            risk.evaluate_trade(position, price)?
        };

        let reason = match (decision, signal) {
            (TradeDecision::StopLoss, _) => ExitReason::StopLoss,
            (TradeDecision::TakeProfit, _) => ExitReason::TakeProfit,
            (TradeDecision::Hold, Signal::Sell) => ExitReason::Signal,
            // Buy while open is ignored, not queued
            (TradeDecision::Hold, _) => return Ok(None),
        };

        self.close_position(symbol, price, reason, now)
    }

    fn close_position(
        &mut self,
        symbol: &str,
        exit_price: FixedDecimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutionError> {
        let result = match self.positions.get(symbol) {
            Some(position) => position.close(exit_price)?,
            None => return Ok(None),
        };
        let Some(position) = self.positions.remove(symbol) else {
            return Ok(None);
        };

        self.balance += result.net_value;

        {
            let mut risk = lock(&self.risk);
            risk.roll_over(now.date_naive());
            risk.record_trade(result.realized_pnl);
            risk.set_account_balance(self.balance);
        }

        self.track_drawdown();

        tracing::info!(
            "Closed {} position: Exit=${:.4}, PnL=${:.2}, Fees=${:.4} ({:?})",
            symbol,
            exit_price,
            result.realized_pnl,
            result.total_fees,
            reason
        );

        self.trades
            .push(TradeRecord::from_close(&position, &result, exit_price, now, reason));

        Ok(Some(TradeEvent::Closed {
            symbol: symbol.to_string(),
            exit: exit_price,
            pnl: result.realized_pnl,
            fees: result.total_fees,
            reason,
        }))
    }

    fn track_drawdown(&mut self) {
        self.max_balance = self.max_balance.max(self.balance);
        if !self.max_balance.is_positive() {
            return;
        }
        if let Ok(drawdown) = (self.max_balance - self.balance).checked_div(self.max_balance) {
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }
    }

    /// Cash plus the net liquidation value of open positions. Positions
    /// without a price are carried at cost.
    pub fn equity(&self, prices: &HashMap<String, FixedDecimal>) -> Result<FixedDecimal, DecimalError> {
        let mut total = self.balance;
        for (symbol, position) in &self.positions {
            total += match prices.get(symbol) {
                Some(&price) => position.mark_to_market(price)?.net_value,
                None => position.entry_cost(),
            };
        }
        Ok(total)
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let (daily_pnl, daily_trades) = {
            let risk = lock(&self.risk);
            (risk.daily_pnl(), risk.daily_trades())
        };

        let mut open_positions: Vec<Position> = self.positions.values().cloned().collect();
        open_positions.sort_by(|a, b| a.pair().cmp(b.pair()));

        CoordinatorSnapshot {
            balance: self.balance,
            initial_balance: self.initial_balance,
            open_positions,
            daily_pnl,
            daily_trades,
            max_drawdown: self.max_drawdown,
            closed_trades: self.trades.len(),
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics::from_trades(&self.trades, self.initial_balance, self.balance, self.max_drawdown)
    }

    pub fn balance(&self) -> FixedDecimal {
        self.balance
    }

    pub fn initial_balance(&self) -> FixedDecimal {
        self.initial_balance
    }

    pub fn max_drawdown(&self) -> FixedDecimal {
        self.max_drawdown
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn risk_manager(&self) -> SharedRiskManager {
        Arc::clone(&self.risk)
    }
}

fn rejected(symbol: &str, reason: RejectReason) -> TradeEvent {
    TradeEvent::Rejected {
        symbol: symbol.to_string(),
        reason,
    }
}

// The guarded state is plain counters; a panicked holder cannot leave it torn
fn lock(risk: &SharedRiskManager) -> MutexGuard<'_, RiskManager> {
    risk.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::TrailingState;
    use crate::risk::RiskConfig;
    use chrono::{NaiveDate, TimeZone};

    const SYMBOL: &str = "SOL/USDT";

    fn fd(text: &str) -> FixedDecimal {
        FixedDecimal::of(text).unwrap()
    }

    fn at(day: u32, hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap())
    }

    fn coordinator_with(balance: &str, config: RiskConfig) -> ExecutionCoordinator {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let risk = RiskManager::starting_on(fd(balance), config, start).shared();
        ExecutionCoordinator::new(fd(balance), fd("0.001"), risk)
    }

    fn coordinator() -> ExecutionCoordinator {
        coordinator_with("1000", RiskConfig::default())
    }

    #[test]
    fn test_buy_opens_position() {
        let mut ec = coordinator();
        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        assert_eq!(
            event,
            Some(TradeEvent::Opened {
                symbol: SYMBOL.to_string(),
                size: fd("90"),
                entry: fd("100"),
                stop: fd("97"),
                take_profit: fd("106"),
            })
        );
        assert_eq!(ec.balance(), fd("910"));

        let position = ec.position(SYMBOL).unwrap();
        assert_eq!(position.quantity(), fd("0.8991"));
        assert_eq!(position.current_stop(), Some(fd("97")));
        assert_eq!(position.trailing_activation(), Some(fd("104")));
        assert_eq!(position.atr(), fd("2"));
    }

    #[test]
    fn test_buy_while_open_is_ignored() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 101, 2, at(1, 10)).unwrap();
        assert_eq!(event, None);
        assert_eq!(ec.balance(), fd("910"));
        assert_eq!(ec.open_positions().len(), 1);
        assert_eq!(ec.position(SYMBOL).unwrap().entry_price(), fd("100"));
    }

    #[test]
    fn test_sell_and_hold_while_flat_do_nothing() {
        let mut ec = coordinator();
        assert_eq!(ec.on_tick(SYMBOL, Signal::Sell, 100, 2).unwrap(), None);
        assert_eq!(ec.on_tick(SYMBOL, Signal::Hold, 100, 2).unwrap(), None);
        assert_eq!(ec.balance(), fd("1000"));
    }

    #[test]
    fn test_take_profit_closes_and_credits_balance() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let event = ec.on_tick_at(SYMBOL, Signal::Hold, 106, 2, at(1, 12)).unwrap();
        assert_eq!(
            event,
            Some(TradeEvent::Closed {
                symbol: SYMBOL.to_string(),
                exit: fd("106"),
                pnl: fd("5.2092954"),
                fees: fd("0.1853046"),
                reason: ExitReason::TakeProfit,
            })
        );

        assert!(!ec.has_open_position(SYMBOL));
        assert_eq!(ec.balance(), fd("1005.2092954"));

        let snapshot = ec.snapshot();
        assert_eq!(snapshot.daily_pnl, fd("5.2092954"));
        assert_eq!(snapshot.daily_trades, 1);
        assert_eq!(snapshot.closed_trades, 1);
        assert_eq!(ec.trades()[0].holding_period_minutes, 180);
    }

    #[test]
    fn test_stop_loss_closes_position() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let event = ec.on_tick_at(SYMBOL, Signal::Hold, 96, 2, at(1, 10)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Closed { reason: ExitReason::StopLoss, pnl, .. }) if pnl == fd("-3.7727136")
        ));
        assert_eq!(ec.balance(), fd("996.2272864"));
        assert!(ec.max_drawdown().is_positive());
    }

    #[test]
    fn test_sell_signal_closes_position() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let event = ec.on_tick_at(SYMBOL, Signal::Sell, 101, 2, at(1, 10)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Closed { reason: ExitReason::Signal, .. })
        ));
        assert!(!ec.has_open_position(SYMBOL));
    }

    #[test]
    fn test_trailing_stop_tightens_then_exits() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        // past activation (104): 105 - 4 = 101
        assert_eq!(ec.on_tick_at(SYMBOL, Signal::Hold, 105, 2, at(1, 10)).unwrap(), None);
        let position = ec.position(SYMBOL).unwrap();
        assert_eq!(position.current_stop(), Some(fd("101")));
        assert_eq!(position.trailing_state(), TrailingState::Active);

        // pullback does not loosen the stop
        assert_eq!(ec.on_tick_at(SYMBOL, Signal::Hold, "104.5", 2, at(1, 11)).unwrap(), None);
        assert_eq!(ec.position(SYMBOL).unwrap().current_stop(), Some(fd("101")));

        let event = ec.on_tick_at(SYMBOL, Signal::Hold, "100.9", 2, at(1, 12)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Closed { reason: ExitReason::StopLoss, .. })
        ));
    }

    #[test]
    fn test_daily_loss_limit_rejects_until_next_day() {
        let mut ec = coordinator();
        ec.risk_manager().lock().unwrap().record_trade(fd("-25"));

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        assert_eq!(
            event,
            Some(TradeEvent::Rejected {
                symbol: SYMBOL.to_string(),
                reason: RejectReason::DailyLossLimit,
            })
        );
        assert_eq!(ec.balance(), fd("1000"));

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(2, 0)).unwrap();
        assert!(matches!(event, Some(TradeEvent::Opened { .. })));
    }

    #[test]
    fn test_trade_count_limit() {
        let config = RiskConfig {
            max_trades: 1,
            ..Default::default()
        };
        let mut ec = coordinator_with("1000", config);

        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        ec.on_tick_at(SYMBOL, Signal::Sell, 101, 2, at(1, 10)).unwrap();

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 11)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Rejected { reason: RejectReason::TradeLimit, .. })
        ));
    }

    #[test]
    fn test_entry_capped_by_risk_per_trade() {
        let config = RiskConfig {
            risk_per_trade: fd("0.001"),
            ..Default::default()
        };
        let mut ec = coordinator_with("1000", config);

        // $1 at risk over a 3% stop plus 0.2% fees: 1 / 0.032
        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Opened { size, .. }) if size == fd("31.25")
        ));
        assert_eq!(ec.balance(), fd("968.75"));

        ec.on_tick_at(SYMBOL, Signal::Sell, 101, 2, at(1, 10)).unwrap();
        let risk_balance = ec.risk_manager().lock().unwrap().account_balance();
        assert_eq!(risk_balance, ec.balance());
    }

    #[test]
    fn test_risk_cap_below_minimum_rejects() {
        let config = RiskConfig {
            risk_per_trade: fd("0.0001"),
            ..Default::default()
        };
        let mut ec = coordinator_with("1000", config);

        // 0.1 / 0.032 = 3.125, under the 10 USDT floor
        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Rejected { reason: RejectReason::BelowMinimumSize, .. })
        ));
        assert_eq!(ec.balance(), fd("1000"));
    }

    #[test]
    fn test_from_config_rolls_over_replayed_days() {
        let config = BotConfig {
            initial_balance: fd("1000"),
            ..Default::default()
        };
        let mut ec = ExecutionCoordinator::from_config(&config);

        for hour in 0..10 {
            ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, hour)).unwrap();
            ec.on_tick_at(SYMBOL, Signal::Sell, 101, 2, at(1, hour)).unwrap();
        }
        assert_eq!(ec.snapshot().daily_trades, 10);

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 23)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Rejected { reason: RejectReason::TradeLimit, .. })
        ));

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(2, 0)).unwrap();
        assert!(matches!(event, Some(TradeEvent::Opened { .. })));
        assert_eq!(ec.snapshot().daily_trades, 0);
        assert_eq!(
            ec.risk_manager().lock().unwrap().last_reset_date(),
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn test_small_balance_rejected_below_minimum() {
        let mut ec = coordinator_with("100", RiskConfig::default());

        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Rejected { reason: RejectReason::BelowMinimumSize, .. })
        ));
        assert_eq!(ec.balance(), fd("100"));
        assert!(!ec.has_open_position(SYMBOL));
    }

    #[test]
    fn test_order_minimum_enforced_when_trade_amount_is_lower() {
        let config = RiskConfig {
            min_trade_amount: fd("1"),
            ..Default::default()
        };
        let mut ec = coordinator_with("100", config);

        // sized to 9 USDT: passes the risk floor, fails the order minimum
        let event = ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Rejected { reason: RejectReason::BelowMinimumSize, .. })
        ));
        assert!(!ec.has_open_position(SYMBOL));
    }

    #[test]
    fn test_invalid_inputs_abort_without_mutation() {
        let mut ec = coordinator();

        let result = ec.on_tick(SYMBOL, Signal::Buy, 0, 2);
        assert!(matches!(
            result,
            Err(ExecutionError::Open(OpenError::InvalidEntryPrice(_)))
        ));

        let result = ec.on_tick(SYMBOL, Signal::Buy, f64::NAN, 2);
        assert!(matches!(
            result,
            Err(ExecutionError::Decimal(DecimalError::Conversion(_)))
        ));

        assert_eq!(ec.balance(), fd("1000"));
        assert!(ec.open_positions().is_empty());
        assert_eq!(ec.snapshot().daily_trades, 0);
    }

    #[test]
    fn test_partial_then_full_close() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let event = ec.close_partial_at(SYMBOL, 102, "0.5", at(1, 10)).unwrap();
        assert_eq!(
            event,
            Some(TradeEvent::Reduced {
                symbol: SYMBOL.to_string(),
                closed_quantity: fd("0.44955"),
                remaining_quantity: fd("0.44955"),
                net_value: fd("45.8082459"),
                pnl: fd("0.8082459"),
            })
        );
        assert_eq!(ec.balance(), fd("955.8082459"));
        assert_eq!(ec.snapshot().daily_trades, 0);
        assert_eq!(ec.snapshot().daily_pnl, fd("0.8082459"));

        let event = ec.close_partial_at(SYMBOL, 102, 1, at(1, 11)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Closed { reason: ExitReason::Manual, .. })
        ));
        assert!(!ec.has_open_position(SYMBOL));
        assert_eq!(ec.snapshot().daily_trades, 1);
    }

    #[test]
    fn test_partial_close_of_dust_closes_position() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 1_000_000_000, 20_000_000, at(1, 9)).unwrap();
        assert_eq!(ec.position(SYMBOL).unwrap().quantity(), fd("0.00000009"));

        // 0.99 of 9e-8 rounds back up to 9e-8
        let event = ec.close_partial_at(SYMBOL, 1_000_000_000, "0.99", at(1, 10)).unwrap();
        assert!(matches!(
            event,
            Some(TradeEvent::Closed { reason: ExitReason::Manual, .. })
        ));
        assert!(!ec.has_open_position(SYMBOL));
        assert!(ec.open_positions().is_empty());
        assert_eq!(ec.snapshot().daily_trades, 1);
        assert_eq!(ec.trades().len(), 1);
    }

    #[test]
    fn test_partial_close_bad_ratio() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();

        let result = ec.close_partial(SYMBOL, 102, "1.5");
        assert!(matches!(
            result,
            Err(ExecutionError::Close(CloseError::InvalidRatio(_)))
        ));
        assert_eq!(ec.balance(), fd("910"));
        assert_eq!(ec.position(SYMBOL).unwrap().quantity(), fd("0.8991"));
    }

    #[test]
    fn test_partial_close_without_position() {
        let mut ec = coordinator();
        assert_eq!(ec.close_partial(SYMBOL, 102, "0.5").unwrap(), None);
    }

    #[test]
    fn test_equity_and_snapshot() {
        let mut ec = coordinator();
        ec.on_tick_at(SYMBOL, Signal::Buy, 100, 2, at(1, 9)).unwrap();
        ec.on_tick_at("JUP/USDT", Signal::Buy, 1, "0.02", at(1, 9)).unwrap();

        let mut prices = HashMap::new();
        prices.insert(SYMBOL.to_string(), fd("100"));

        // SOL marked at 100: 89.9100 - 0.08991 fee; JUP carried at cost
        let jup_cost = ec.position("JUP/USDT").unwrap().entry_cost();
        let expected = ec.balance() + fd("89.82009") + jup_cost;
        assert_eq!(ec.equity(&prices).unwrap(), expected);

        let snapshot = ec.snapshot();
        assert_eq!(snapshot.open_positions.len(), 2);
        assert_eq!(snapshot.open_positions[0].pair(), "JUP/USDT");
        assert_eq!(snapshot.initial_balance, fd("1000"));
    }
}
