use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::decimal::FixedDecimal;
use crate::execution::coordinator::ExitReason;
use crate::execution::position::{CloseResult, Position};

/// Record of a single round trip for the trade ledger
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub position_id: Uuid,
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: FixedDecimal,
    pub exit_price: FixedDecimal,
    pub usdt_size: FixedDecimal,
    pub quantity: FixedDecimal,
    pub pnl: FixedDecimal,
    pub fees: FixedDecimal,
    pub exit_reason: ExitReason,
    pub holding_period_minutes: i64,
}

impl TradeRecord {
    pub fn from_close(
        position: &Position,
        result: &CloseResult,
        exit_price: FixedDecimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Self {
        Self {
            position_id: position.id(),
            symbol: position.pair().to_string(),
            entry_time: position.entry_time(),
            exit_time,
            entry_price: position.entry_price(),
            exit_price,
            usdt_size: position.usdt_size(),
            quantity: position.quantity(),
            pnl: result.realized_pnl,
            fees: result.total_fees,
            exit_reason,
            holding_period_minutes: (exit_time - position.entry_time()).num_minutes(),
        }
    }
}

/// Session summary over the trade ledger
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    // P&L
    pub initial_balance: FixedDecimal,
    pub final_balance: FixedDecimal,
    pub total_pnl: FixedDecimal,
    pub total_return_pct: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_pnl: FixedDecimal,
    pub largest_win: FixedDecimal,
    pub largest_loss: FixedDecimal,

    // Costs and risk
    pub total_fees: FixedDecimal,
    pub max_drawdown: FixedDecimal,

    pub exit_reasons: BTreeMap<ExitReason, usize>,
}

impl SessionMetrics {
    pub fn from_trades(
        trades: &[TradeRecord],
        initial_balance: FixedDecimal,
        final_balance: FixedDecimal,
        max_drawdown: FixedDecimal,
    ) -> Self {
        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.pnl.is_positive()).count();
        let losing_trades = total_trades - winning_trades;

        let total_pnl: FixedDecimal = trades.iter().map(|t| t.pnl).sum();
        let total_fees: FixedDecimal = trades.iter().map(|t| t.fees).sum();

        let win_rate = if total_trades > 0 {
            (winning_trades as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };

        let avg_pnl = FixedDecimal::of(total_trades)
            .and_then(|count| total_pnl.checked_div(count))
            .unwrap_or(FixedDecimal::ZERO);

        let largest_win = trades
            .iter()
            .map(|t| t.pnl)
            .filter(FixedDecimal::is_positive)
            .max()
            .unwrap_or(FixedDecimal::ZERO);

        let largest_loss = trades
            .iter()
            .map(|t| t.pnl)
            .filter(|pnl| !pnl.is_positive())
            .min()
            .unwrap_or(FixedDecimal::ZERO);

        let total_return_pct = if initial_balance.is_positive() {
            ((final_balance - initial_balance).to_f64() / initial_balance.to_f64()) * 100.0
        } else {
            0.0
        };

        let mut exit_reasons = BTreeMap::new();
        for trade in trades {
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
        }

        Self {
            initial_balance,
            final_balance,
            total_pnl,
            total_return_pct,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            avg_pnl,
            largest_win,
            largest_loss,
            total_fees,
            max_drawdown,
            exit_reasons,
        }
    }

    pub fn print_summary(&self) {
        println!("\nSession Results:");
        println!("Final Balance: ${:.2}", self.final_balance);
        println!(
            "Total Profit/Loss: ${:.2} ({:.2}%)",
            self.total_pnl, self.total_return_pct
        );
        println!("Max Drawdown: {:.2}%", self.max_drawdown.to_f64() * 100.0);

        if self.total_trades == 0 {
            println!("No trades closed");
            return;
        }

        println!("Number of Trades: {}", self.total_trades);
        println!("Win Rate: {:.2}%", self.win_rate);
        println!("Average Trade Profit: ${:.2}", self.avg_pnl);
        println!("Total Fees Paid: ${:.2}", self.total_fees);

        println!("\nExit Reasons Distribution:");
        for (reason, count) in &self.exit_reasons {
            println!(
                "{:?}: {} trades ({:.1}%)",
                reason,
                count,
                (*count as f64 / self.total_trades as f64) * 100.0
            );
        }
    }
}
