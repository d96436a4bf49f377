//! Trade ledger and equity curve accumulated during one simulation run.

use super::position::Position;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TradeKind {
    Buy,
    Sell,
    ShortSell,
    CoverShort,
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeKind::Buy => "BUY",
            TradeKind::Sell => "SELL",
            TradeKind::ShortSell => "SHORT_SELL",
            TradeKind::CoverShort => "COVER_SHORT",
        };
        f.write_str(s)
    }
}

/// One executed fill. `quantity` is the absolute share count and
/// `value = quantity * price`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Trade {
    pub date: NaiveDate,
    pub kind: TradeKind,
    pub price: f64,
    pub quantity: f64,
    pub value: f64,
    pub commission: f64,
    pub capital_after: f64,
    pub position_after: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoundTripTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub return_pct: f64,
    pub duration_days: i64,
    pub direction: Direction,
}

impl RoundTripTrade {
    fn close(entry: &Trade, exit: &Trade, direction: Direction) -> Self {
        let move_pct = (exit.price - entry.price) / entry.price * 100.0;
        let return_pct = match direction {
            Direction::Long => move_pct,
            Direction::Short => -move_pct,
        };
        RoundTripTrade {
            entry_date: entry.date,
            exit_date: exit.date,
            entry_price: entry.price,
            exit_price: exit.price,
            return_pct,
            duration_days: (exit.date - entry.date).num_days(),
            direction,
        }
    }
}

/// Post-trade portfolio state at the close of one bar.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub price: f64,
    pub position: Position,
    pub capital: f64,
    pub shares: f64,
    pub daily_return: f64,
}

/// Append-only accumulator owned by a single run.
#[derive(Debug, Default)]
pub struct Ledger {
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        tracing::debug!(
            date = %trade.date,
            kind = %trade.kind,
            price = trade.price,
            quantity = trade.quantity,
            commission = trade.commission,
            "trade executed"
        );
        self.trades.push(trade);
    }

    /// Record the bar's closing state; the daily return is taken against the
    /// previous point and is 0 on the first bar or after a zero value.
    pub fn record_equity(
        &mut self,
        date: NaiveDate,
        price: f64,
        position: Position,
        capital: f64,
        shares: f64,
    ) {
        let portfolio_value = capital + shares * price;
        let daily_return = match self.equity_curve.last() {
            Some(prev) if prev.portfolio_value != 0.0 => {
                (portfolio_value - prev.portfolio_value) / prev.portfolio_value
            }
            _ => 0.0,
        };
        self.equity_curve.push(EquityPoint {
            date,
            portfolio_value,
            price,
            position,
            capital,
            shares,
            daily_return,
        });
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn into_parts(self) -> (Vec<EquityPoint>, Vec<Trade>) {
        (self.equity_curve, self.trades)
    }
}

/// Pair entries with exits FIFO per direction. Lots still open at the end
/// are not reported.
pub fn match_round_trips(trades: &[Trade]) -> Vec<RoundTripTrade> {
    let mut open_long: VecDeque<&Trade> = VecDeque::new();
    let mut open_short: VecDeque<&Trade> = VecDeque::new();
    let mut round_trips = Vec::new();

    for trade in trades {
        match trade.kind {
            TradeKind::Buy => open_long.push_back(trade),
            TradeKind::ShortSell => open_short.push_back(trade),
            TradeKind::Sell => {
                if let Some(entry) = open_long.pop_front() {
                    round_trips.push(RoundTripTrade::close(entry, trade, Direction::Long));
                }
            }
            TradeKind::CoverShort => {
                if let Some(entry) = open_short.pop_front() {
                    round_trips.push(RoundTripTrade::close(entry, trade, Direction::Short));
                }
            }
        }
    }

    round_trips
}
