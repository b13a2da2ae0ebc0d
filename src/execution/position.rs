use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{DecimalError, FixedDecimal, IntoFixed};
use crate::risk::StopLevels;

/// Smallest notional (in USDT) a position may be opened with
pub const MIN_ORDER_SIZE: FixedDecimal = FixedDecimal::TEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("entry price must be positive, got {0}")]
    InvalidEntryPrice(FixedDecimal),
    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    #[error("close ratio must be in (0, 1], got {0}")]
    InvalidRatio(FixedDecimal),
    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

/// Trailing-stop sub-state of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailingState {
    Inactive,
    Active,
}

/// Mark-to-market view of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionValue {
    pub gross_value: FixedDecimal,
    pub net_value: FixedDecimal,
    pub unrealized_pnl: FixedDecimal,
    pub exit_fee: FixedDecimal,
    pub total_fees: FixedDecimal,
}

/// Final accounting for a fully closed position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloseResult {
    pub gross_value: FixedDecimal,
    pub net_value: FixedDecimal,
    pub realized_pnl: FixedDecimal,
    pub exit_fee: FixedDecimal,
    pub total_fees: FixedDecimal,
}

/// Accounting for the slice sold by [`Position::close_partial`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartialClose {
    pub gross_value: FixedDecimal,
    pub net_value: FixedDecimal,
    pub exit_fee: FixedDecimal,
    pub closed_quantity: FixedDecimal,
    pub remaining_quantity: FixedDecimal,
    /// Share of entry cost released by this slice
    pub released_cost: FixedDecimal,
}

/// A long spot position bought with `usdt_size` of quote currency.
///
/// The fee is taken out of the notional, so the base quantity held is
/// `(usdt_size - entry_fee) / entry_price`. Quantity, cost and fee only
/// change through [`Position::close_partial`]; stops only ratchet upward.
///
/// With a zero fee rate, `quantity * entry_price` may exceed `usdt_size` by
/// one unit in the eighth digit, since the quantity is rounded half-up.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    id: Uuid,
    pair: String,
    entry_time: DateTime<Utc>,
    entry_price: FixedDecimal,
    usdt_size: FixedDecimal,
    fee_rate: FixedDecimal,
    entry_fee: FixedDecimal,
    quantity: FixedDecimal,
    entry_cost: FixedDecimal,
    stop_loss: Option<FixedDecimal>,
    current_stop: Option<FixedDecimal>,
    take_profit: Option<FixedDecimal>,
    trailing_stop: Option<FixedDecimal>,
    trailing_activation: Option<FixedDecimal>,
    atr: FixedDecimal,
    trailing: TrailingState,
}

impl Position {
    /// Open a position now
    pub fn open<P, S, F>(
        pair: impl Into<String>,
        entry_price: P,
        usdt_size: S,
        fee_rate: F,
    ) -> Result<Self, OpenError>
    where
        P: IntoFixed,
        S: IntoFixed,
        F: IntoFixed,
    {
        Self::open_at(pair, entry_price, usdt_size, fee_rate, None)
    }

    /// Open a position with explicit timestamp (for replays)
    pub fn open_at<P, S, F>(
        pair: impl Into<String>,
        entry_price: P,
        usdt_size: S,
        fee_rate: F,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self, OpenError>
    where
        P: IntoFixed,
        S: IntoFixed,
        F: IntoFixed,
    {
        let entry_price = FixedDecimal::of(entry_price)?;
        let usdt_size = FixedDecimal::of(usdt_size)?;
        let fee_rate = FixedDecimal::of(fee_rate)?;

        if !entry_price.is_positive() {
            return Err(OpenError::InvalidEntryPrice(entry_price));
        }

        let entry_fee = usdt_size.checked_mul(fee_rate)?;
        let quantity = usdt_size.checked_sub(entry_fee)?.checked_div(entry_price)?;

        Ok(Self {
            id: Uuid::new_v4(),
            pair: pair.into(),
            entry_time: timestamp.unwrap_or_else(Utc::now),
            entry_price,
            usdt_size,
            fee_rate,
            entry_fee,
            quantity,
            entry_cost: usdt_size,
            stop_loss: None,
            current_stop: None,
            take_profit: None,
            trailing_stop: None,
            trailing_activation: None,
            atr: FixedDecimal::ZERO,
            trailing: TrailingState::Inactive,
        })
    }

    /// Admission check: positions below the exchange minimum must not be kept
    pub fn is_valid(&self) -> bool {
        self.usdt_size >= MIN_ORDER_SIZE
    }

    /// Value the position at `current_price` without touching it
    pub fn mark_to_market<P: IntoFixed>(&self, current_price: P) -> Result<PositionValue, DecimalError> {
        let current_price = FixedDecimal::of(current_price)?;
        let (gross_value, exit_fee, net_value) = self.exit_values(self.quantity, current_price)?;

        Ok(PositionValue {
            gross_value,
            net_value,
            unrealized_pnl: net_value.checked_sub(self.entry_cost)?,
            exit_fee,
            total_fees: self.entry_fee.checked_add(exit_fee)?,
        })
    }

    /// Final values for selling everything at `exit_price`.
    ///
    /// The position itself is left as is; the owner drops it afterwards.
    pub fn close<P: IntoFixed>(&self, exit_price: P) -> Result<CloseResult, DecimalError> {
        let exit_price = FixedDecimal::of(exit_price)?;
        let (gross_value, exit_fee, net_value) = self.exit_values(self.quantity, exit_price)?;

        Ok(CloseResult {
            gross_value,
            net_value,
            realized_pnl: net_value.checked_sub(self.entry_cost)?,
            exit_fee,
            total_fees: self.entry_fee.checked_add(exit_fee)?,
        })
    }

    /// Sell `close_ratio` of the position at `exit_price`.
    ///
    /// Entry cost and entry fee shrink by the same ratio as the quantity.
    /// Nothing is mutated if either input is rejected.
    pub fn close_partial<P, R>(&mut self, exit_price: P, close_ratio: R) -> Result<PartialClose, CloseError>
    where
        P: IntoFixed,
        R: IntoFixed,
    {
        let exit_price = FixedDecimal::of(exit_price)?;
        let close_ratio = FixedDecimal::of(close_ratio)?;

        if !close_ratio.is_positive() || close_ratio > FixedDecimal::ONE {
            return Err(CloseError::InvalidRatio(close_ratio));
        }

        let closed_quantity = self.quantity * close_ratio;
        let remaining_quantity = self.quantity - closed_quantity;
        let (gross_value, exit_fee, net_value) = self.exit_values(closed_quantity, exit_price)?;

        let keep = FixedDecimal::ONE - close_ratio;
        let remaining_cost = self.entry_cost * keep;
        let released_cost = self.entry_cost - remaining_cost;

        self.quantity = remaining_quantity;
        self.entry_cost = remaining_cost;
        self.entry_fee = self.entry_fee * keep;

        Ok(PartialClose {
            gross_value,
            net_value,
            exit_fee,
            closed_quantity,
            remaining_quantity,
            released_cost,
        })
    }

    /// Install freshly computed stop levels. The trailing stop starts at the
    /// initial stop loss.
    pub fn apply_stop_levels(&mut self, levels: &StopLevels) {
        self.stop_loss = Some(levels.stop_loss);
        self.current_stop = Some(levels.stop_loss);
        self.trailing_stop = Some(levels.stop_loss);
        self.take_profit = Some(levels.take_profit);
        self.trailing_activation = Some(levels.trailing_activation);
        self.atr = levels.atr;
    }

    /// Ratchet the stop. Only a strictly higher stop is adopted; returns
    /// whether it was.
    pub fn adopt_stop(&mut self, new_stop: FixedDecimal) -> bool {
        if self.current_stop.is_some_and(|stop| new_stop <= stop) {
            return false;
        }
        self.current_stop = Some(new_stop);
        self.trailing_stop = Some(new_stop);
        self.trailing = TrailingState::Active;
        true
    }

    fn exit_values(
        &self,
        quantity: FixedDecimal,
        price: FixedDecimal,
    ) -> Result<(FixedDecimal, FixedDecimal, FixedDecimal), DecimalError> {
        let gross_value = quantity.checked_mul(price)?;
        let exit_fee = gross_value.checked_mul(self.fee_rate)?;
        Ok((gross_value, exit_fee, gross_value.checked_sub(exit_fee)?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn entry_price(&self) -> FixedDecimal {
        self.entry_price
    }

    pub fn usdt_size(&self) -> FixedDecimal {
        self.usdt_size
    }

    pub fn fee_rate(&self) -> FixedDecimal {
        self.fee_rate
    }

    pub fn entry_fee(&self) -> FixedDecimal {
        self.entry_fee
    }

    pub fn quantity(&self) -> FixedDecimal {
        self.quantity
    }

    pub fn entry_cost(&self) -> FixedDecimal {
        self.entry_cost
    }

    pub fn stop_loss(&self) -> Option<FixedDecimal> {
        self.stop_loss
    }

    pub fn current_stop(&self) -> Option<FixedDecimal> {
        self.current_stop
    }

    pub fn take_profit(&self) -> Option<FixedDecimal> {
        self.take_profit
    }

    pub fn trailing_stop(&self) -> Option<FixedDecimal> {
        self.trailing_stop
    }

    pub fn trailing_activation(&self) -> Option<FixedDecimal> {
        self.trailing_activation
    }

    pub fn atr(&self) -> FixedDecimal {
        self.atr
    }

    pub fn trailing_state(&self) -> TrailingState {
        self.trailing
    }
}
