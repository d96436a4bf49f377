//! Signal synthesis: boolean condition series into a position series.
//!
//! Modes:
//! - long/cash: LONG where `long` holds and `cash` does not (plain `long`
//!   without a cash signal), values in {0, 1}
//! - long/short: LONG where only `long` holds, SHORT where only `short` holds,
//!   LONG when both hold, CASH otherwise
//! - legacy single expression: 0/1 straight from the expression

use crate::domain::error::StratlabError;
use crate::domain::expression_eval::parse_and_evaluate;
use crate::domain::position::Position;
use crate::domain::series::{ConditionSeries, ConditionSet, PositionSeries};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyType {
    #[default]
    LongCash,
    LongShort,
}

impl FromStr for StrategyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long_cash" => Ok(StrategyType::LongCash),
            "long_short" => Ok(StrategyType::LongShort),
            other => Err(format!(
                "unknown strategy type '{}' (expected long_cash or long_short)",
                other
            )),
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyType::LongCash => f.write_str("long_cash"),
            StrategyType::LongShort => f.write_str("long_short"),
        }
    }
}

/// Expressions that define one strategy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyRules {
    pub name: String,
    pub strategy_type: StrategyType,
    pub long: Option<String>,
    pub cash: Option<String>,
    pub short: Option<String>,
    /// Legacy single-expression form, used when `long` is absent.
    pub expression: Option<String>,
}

impl StrategyRules {
    /// Configured expressions as `(field, text)` pairs, in evaluation order.
    pub fn expressions(&self) -> Vec<(&'static str, &str)> {
        [
            ("long", self.long.as_deref()),
            ("cash", self.cash.as_deref()),
            ("short", self.short.as_deref()),
            ("expression", self.expression.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, text)| text.map(|t| (field, t)))
        .collect()
    }
}

pub fn long_cash(
    long: &ConditionSeries,
    cash: Option<&ConditionSeries>,
) -> Result<PositionSeries, StratlabError> {
    let Some(cash) = cash else {
        return Ok(single(long));
    };
    if !long.same_axis(cash) {
        return Err(StratlabError::schema(
            "long and cash signals are not aligned to the same dates",
        ));
    }
    let values = long
        .values()
        .iter()
        .zip(cash.values())
        .map(|(&l, &c)| {
            if l && !c {
                Position::Long
            } else {
                Position::Cash
            }
        })
        .collect();
    PositionSeries::new(long.dates().to_vec(), values)
}

pub fn long_short(
    long: &ConditionSeries,
    short: &ConditionSeries,
) -> Result<PositionSeries, StratlabError> {
    if !long.same_axis(short) {
        return Err(StratlabError::schema(
            "long and short signals are not aligned to the same dates",
        ));
    }
    let values = long
        .values()
        .iter()
        .zip(short.values())
        .map(|(&l, &s)| match (l, s) {
            (true, _) => Position::Long,
            (false, true) => Position::Short,
            (false, false) => Position::Cash,
        })
        .collect();
    PositionSeries::new(long.dates().to_vec(), values)
}

pub fn single(signal: &ConditionSeries) -> PositionSeries {
    signal.map(|&b| if b { Position::Long } else { Position::Cash })
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.trim().is_empty())
}

/// Parse and evaluate the strategy's expressions and derive its positions.
pub fn synthesize(
    rules: &StrategyRules,
    conditions: &ConditionSet,
) -> Result<PositionSeries, StratlabError> {
    let long_text = non_empty(&rules.long);
    let legacy_text = non_empty(&rules.expression);

    let Some(entry_text) = long_text.or(legacy_text) else {
        return Err(StratlabError::validation(format!(
            "strategy '{}' needs a long expression",
            rules.name
        )));
    };
    let entry = parse_and_evaluate(entry_text, conditions)?;

    let positions = match rules.strategy_type {
        StrategyType::LongCash => {
            if long_text.is_none() {
                single(&entry)
            } else {
                let cash = non_empty(&rules.cash)
                    .map(|text| parse_and_evaluate(text, conditions))
                    .transpose()?;
                long_cash(&entry, cash.as_ref())?
            }
        }
        StrategyType::LongShort => {
            if long_text.is_none() {
                return Err(StratlabError::validation(format!(
                    "long_short strategy '{}' needs a long expression",
                    rules.name
                )));
            }
            let Some(short_text) = non_empty(&rules.short) else {
                return Err(StratlabError::validation(format!(
                    "long_short strategy '{}' needs a short expression",
                    rules.name
                )));
            };
            let short = parse_and_evaluate(short_text, conditions)?;
            long_short(&entry, &short)?
        }
    };

    tracing::debug!(
        strategy = %rules.name,
        kind = %rules.strategy_type,
        bars = positions.len(),
        "synthesized position signal"
    );
    Ok(positions)
}
