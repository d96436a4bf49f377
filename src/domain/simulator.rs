//! Single-asset, fully invested backtest simulation.
//!
//! Each bar: if the target position differs from the current one, the
//! transition executes at the bar's close, then the post-trade state is
//! recorded on the equity curve. Reversals are an exit followed by an entry
//! on the same date and price.

use super::error::StratlabError;
use super::ledger::{EquityPoint, Ledger, RoundTripTrade, Trade, TradeKind, match_round_trips};
use super::position::Position;
use super::price::{PriceBar, dates_strictly_ascending};
use super::series::PositionSeries;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

pub const MIN_INITIAL_CAPITAL: f64 = 100.0;
pub const MAX_FEE_RATE: f64 = 0.1;
pub const DEFAULT_FEE_RATE: f64 = 0.001;

/// How the fee is charged when entering a long position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FeeConvention {
    /// Commission is taken out of capital before sizing, on every long entry.
    #[default]
    Absorbed,
    /// Long re-entry after covering a short sizes at `price * (1 + fee)`.
    Legacy,
}

impl FromStr for FeeConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "absorbed" => Ok(FeeConvention::Absorbed),
            "legacy" => Ok(FeeConvention::Legacy),
            other => Err(format!(
                "unknown fee convention '{}' (expected absorbed or legacy)",
                other
            )),
        }
    }
}

impl fmt::Display for FeeConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeConvention::Absorbed => f.write_str("absorbed"),
            FeeConvention::Legacy => f.write_str("legacy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub fee_rate: f64,
    pub fee_convention: FeeConvention,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_capital: 10_000.0,
            fee_rate: DEFAULT_FEE_RATE,
            fee_convention: FeeConvention::Absorbed,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), StratlabError> {
        if !self.initial_capital.is_finite() || self.initial_capital < MIN_INITIAL_CAPITAL {
            return Err(StratlabError::validation(format!(
                "initial capital must be at least {}, got {}",
                MIN_INITIAL_CAPITAL, self.initial_capital
            )));
        }
        if !(0.0..MAX_FEE_RATE).contains(&self.fee_rate) {
            return Err(StratlabError::validation(format!(
                "fee rate must be in [0, {}), got {}",
                MAX_FEE_RATE, self.fee_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimulationOutput {
    pub initial_capital: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub round_trips: Vec<RoundTripTrade>,
}

impl SimulationOutput {
    pub fn final_value(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.portfolio_value)
            .unwrap_or(self.initial_capital)
    }
}

/// Mutable account state for one run.
struct Account {
    capital: f64,
    shares: f64,
    position: Position,
    fee_rate: f64,
    ledger: Ledger,
}

impl Account {
    fn new(config: &SimulationConfig) -> Self {
        Account {
            capital: config.initial_capital,
            shares: 0.0,
            position: Position::Cash,
            fee_rate: config.fee_rate,
            ledger: Ledger::new(),
        }
    }

    fn value(&self, price: f64) -> f64 {
        self.capital + self.shares * price
    }

    fn record(&mut self, date: NaiveDate, kind: TradeKind, price: f64, quantity: f64, commission: f64) {
        self.ledger.record_trade(Trade {
            date,
            kind,
            price,
            quantity,
            value: quantity * price,
            commission,
            capital_after: self.capital,
            position_after: self.position,
        });
    }

    /// Enter long with all capital.
    ///
    /// 1. Skip if capital is not positive
    /// 2. Commission = capital * fee
    /// 3. Shares = (capital - commission) / price
    /// 4. Capital goes to zero
    fn enter_long(&mut self, date: NaiveDate, price: f64) {
        if self.capital <= 0.0 {
            tracing::debug!(%date, capital = self.capital, "no capital for long entry, staying in cash");
            return;
        }
        let commission = self.capital * self.fee_rate;
        let shares = (self.capital - commission) / price;
        self.shares = shares;
        self.capital = 0.0;
        self.position = Position::Long;
        self.record(date, TradeKind::Buy, price, shares, commission);
    }

    /// Long entry sized at `price * (1 + fee)`; commission is the remainder.
    fn enter_long_fee_on_top(&mut self, date: NaiveDate, price: f64) {
        if self.capital <= 0.0 {
            tracing::debug!(%date, capital = self.capital, "no capital for long entry, staying in cash");
            return;
        }
        let shares = self.capital / (price * (1.0 + self.fee_rate));
        let commission = shares * price * self.fee_rate;
        self.shares = shares;
        self.capital = 0.0;
        self.position = Position::Long;
        self.record(date, TradeKind::Buy, price, shares, commission);
    }

    /// Short the full portfolio value.
    ///
    /// 1. Skip if portfolio value is not positive
    /// 2. Shares = -(value / price)
    /// 3. Capital = value + proceeds - proceeds * fee
    fn enter_short(&mut self, date: NaiveDate, price: f64) {
        let value = self.value(price);
        if value <= 0.0 {
            tracing::debug!(%date, value, "no value for short entry, staying in cash");
            return;
        }
        let quantity = value / price;
        let proceeds = value;
        let commission = proceeds * self.fee_rate;
        self.shares = -quantity;
        self.capital = value + proceeds - commission;
        self.position = Position::Short;
        self.record(date, TradeKind::ShortSell, price, quantity, commission);
    }

    fn exit_long(&mut self, date: NaiveDate, price: f64) {
        let quantity = self.shares;
        let sale = quantity * price;
        let commission = sale * self.fee_rate;
        self.capital += sale - commission;
        self.shares = 0.0;
        self.position = Position::Cash;
        self.record(date, TradeKind::Sell, price, quantity, commission);
    }

    fn cover_short(&mut self, date: NaiveDate, price: f64) {
        let quantity = self.shares.abs();
        let cover = quantity * price;
        let commission = cover * self.fee_rate;
        self.capital -= cover + commission;
        self.shares = 0.0;
        self.position = Position::Cash;
        self.record(date, TradeKind::CoverShort, price, quantity, commission);
    }

    fn transition(
        &mut self,
        target: Position,
        date: NaiveDate,
        price: f64,
        convention: FeeConvention,
    ) {
        match (self.position, target) {
            (Position::Cash, Position::Long) => self.enter_long(date, price),
            (Position::Cash, Position::Short) => self.enter_short(date, price),
            (Position::Long, Position::Cash) => self.exit_long(date, price),
            (Position::Short, Position::Cash) => self.cover_short(date, price),
            (Position::Long, Position::Short) => {
                self.exit_long(date, price);
                self.enter_short(date, price);
            }
            (Position::Short, Position::Long) => {
                self.cover_short(date, price);
                match convention {
                    FeeConvention::Absorbed => self.enter_long(date, price),
                    FeeConvention::Legacy => self.enter_long_fee_on_top(date, price),
                }
            }
            (Position::Long, Position::Long)
            | (Position::Cash, Position::Cash)
            | (Position::Short, Position::Short) => {}
        }
    }
}

fn check_bars(bars: &[PriceBar], signal: &PositionSeries) -> Result<(), StratlabError> {
    if bars.is_empty() {
        return Err(StratlabError::schema("no price bars to simulate"));
    }
    if !dates_strictly_ascending(bars) {
        return Err(StratlabError::schema(
            "price bar dates must be unique and ascending",
        ));
    }
    if let Some(bar) = bars.iter().find(|b| !b.has_valid_close()) {
        return Err(StratlabError::schema(format!(
            "invalid close price {} on {}",
            bar.close, bar.date
        )));
    }
    if let Some(bar) = bars.iter().find(|b| signal.get(b.date).is_none()) {
        return Err(StratlabError::schema(format!(
            "position signal has no value for {}",
            bar.date
        )));
    }
    Ok(())
}

/// Run the simulation over `bars`, trading toward `signal` at each close.
pub fn run(
    bars: &[PriceBar],
    signal: &PositionSeries,
    config: &SimulationConfig,
) -> Result<SimulationOutput, StratlabError> {
    config.validate()?;
    check_bars(bars, signal)?;

    let mut account = Account::new(config);
    for bar in bars {
        let target = signal.value_at(bar.date).unwrap_or_default();
        if target != account.position {
            account.transition(target, bar.date, bar.close, config.fee_convention);
        }
        let (capital, shares, position) = (account.capital, account.shares, account.position);
        account
            .ledger
            .record_equity(bar.date, bar.close, position, capital, shares);
    }

    let (equity_curve, trades) = account.ledger.into_parts();
    let round_trips = match_round_trips(&trades);

    tracing::debug!(
        bars = bars.len(),
        trades = trades.len(),
        round_trips = round_trips.len(),
        "simulation complete"
    );

    Ok(SimulationOutput {
        initial_capital: config.initial_capital,
        equity_curve,
        trades,
        round_trips,
    })
}
