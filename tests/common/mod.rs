#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
pub use stratlab::domain::price::PriceBar;
use stratlab::domain::backtest::BacktestConfig;
use stratlab::domain::error::StratlabError;
use stratlab::domain::series::{ConditionSeries, ConditionSet};
use stratlab::domain::signal::{StrategyRules, StrategyType};
use stratlab::domain::simulator::SimulationConfig;
use stratlab::ports::data_port::{DataPort, MarketData};

pub struct MockDataPort {
    pub data: HashMap<String, MarketData>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_market(mut self, symbol: &str, bars: Vec<PriceBar>, conditions: ConditionSet) -> Self {
        self.data
            .insert(symbol.to_string(), MarketData { bars, conditions });
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_market_data(&self, symbol: &str) -> Result<MarketData, StratlabError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StratlabError::Schema {
                reason: reason.clone(),
            });
        }
        self.data
            .get(symbol)
            .cloned()
            .ok_or_else(|| StratlabError::NoData {
                symbol: symbol.to_string(),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day(i: usize) -> NaiveDate {
    date(2024, 1, 1) + chrono::Duration::days(i as i64)
}

pub fn make_bar(date: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        date,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000.0,
    }
}

/// One bar per day starting 2024-01-01.
pub fn generate_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(day(i), c))
        .collect()
}

pub fn condition(values: &[bool]) -> ConditionSeries {
    let dates = (0..values.len()).map(day).collect();
    ConditionSeries::new(dates, values.to_vec()).unwrap()
}

pub fn conditions(pairs: &[(&str, &[bool])]) -> ConditionSet {
    pairs
        .iter()
        .map(|(name, values)| (name.to_string(), condition(values)))
        .collect()
}

pub fn long_cash(name: &str, long: &str) -> StrategyRules {
    StrategyRules {
        name: name.into(),
        strategy_type: StrategyType::LongCash,
        long: Some(long.into()),
        ..Default::default()
    }
}

pub fn long_short(name: &str, long: &str, short: &str) -> StrategyRules {
    StrategyRules {
        name: name.into(),
        strategy_type: StrategyType::LongShort,
        long: Some(long.into()),
        short: Some(short.into()),
        ..Default::default()
    }
}

pub fn zero_fee_config() -> BacktestConfig {
    BacktestConfig {
        simulation: SimulationConfig {
            fee_rate: 0.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// CSV text for `<symbol>.csv` with the given closes and condition columns.
pub fn market_csv(closes: &[f64], columns: &[(&str, &[bool])]) -> String {
    let mut out = String::from("date,open,high,low,close,volume");
    for (name, _) in columns {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');
    for (i, close) in closes.iter().enumerate() {
        out.push_str(&format!("{},{c},{c},{c},{c},1000", day(i), c = close));
        for (_, values) in columns {
            out.push_str(if values[i] { ",true" } else { ",false" });
        }
        out.push('\n');
    }
    out
}
