//! Combination of independent strategy signals into one position series.
//!
//! All methods operate on the date intersection of the inputs and are a
//! single sequential pass, O(dates x signals).
//!
//! - `Weighted`: normalized weighted score, discretized at +/-0.3
//! - `Majority`: vote tally; plurality, or threshold with hysteresis
//! - `Custom`: restricted boolean test over strategy positions

use crate::domain::error::StratlabError;
use crate::domain::position::Position;
use crate::domain::series::{PositionSeries, ScoreSeries, intersect_dates};
use crate::domain::vote_expression::{self, VoteExpr};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Weighted scores above this go LONG, below its negation go SHORT.
pub const WEIGHTED_SCORE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationMethod {
    Weighted {
        weights: Option<HashMap<String, f64>>,
    },
    Majority {
        threshold: Option<f64>,
        exit_threshold: Option<f64>,
    },
    Custom {
        expression: String,
    },
}

impl AggregationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationMethod::Weighted { .. } => "weighted",
            AggregationMethod::Majority { .. } => "majority",
            AggregationMethod::Custom { .. } => "custom",
        }
    }
}

/// One contributing strategy's positions.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSignal {
    pub name: String,
    pub positions: PositionSeries,
}

impl NamedSignal {
    pub fn new(name: impl Into<String>, positions: PositionSeries) -> Self {
        Self {
            name: name.into(),
            positions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AggregationMetadata {
    pub method: &'static str,
    pub strategies: Vec<String>,
    pub dates: usize,
    /// Normalized weights, weighted method only.
    pub weights: Option<Vec<(String, f64)>>,
    /// Continuous score per date, weighted method only.
    pub scores: Option<ScoreSeries>,
    /// Dates forced to CASH because the custom expression failed on them.
    pub recovered_dates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    long: usize,
    short: usize,
    cash: usize,
}

impl Tally {
    fn of<I: IntoIterator<Item = Position>>(positions: I) -> Self {
        let mut t = Tally::default();
        for p in positions {
            match p {
                Position::Long => t.long += 1,
                Position::Short => t.short += 1,
                Position::Cash => t.cash += 1,
            }
        }
        t
    }

    /// Largest bucket wins; any tie at the top goes to CASH.
    fn plurality(&self) -> Position {
        if self.long > self.short && self.long > self.cash {
            Position::Long
        } else if self.short > self.long && self.short > self.cash {
            Position::Short
        } else {
            Position::Cash
        }
    }
}

pub fn combine(
    signals: &[NamedSignal],
    method: &AggregationMethod,
) -> Result<(PositionSeries, AggregationMetadata), StratlabError> {
    if signals.is_empty() {
        return Err(StratlabError::validation("no signals to combine"));
    }
    let mut seen = HashSet::new();
    for s in signals {
        if !seen.insert(s.name.as_str()) {
            return Err(StratlabError::validation(format!(
                "duplicate strategy name '{}'",
                s.name
            )));
        }
    }

    let dates = intersect_dates(signals.iter().map(|s| &s.positions));
    let rows = aligned_rows(signals, &dates);

    let mut metadata = AggregationMetadata {
        method: method.name(),
        strategies: signals.iter().map(|s| s.name.clone()).collect(),
        dates: dates.len(),
        weights: None,
        scores: None,
        recovered_dates: 0,
    };

    let values = match method {
        AggregationMethod::Weighted { weights } => {
            let normalized = normalize_weights(signals, weights.as_ref())?;
            let scores: Vec<f64> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .zip(&normalized)
                        .map(|(p, (_, w))| w * p.as_f64())
                        .sum()
                })
                .collect();
            let values = scores.iter().map(|&s| discretize(s)).collect();
            metadata.scores = Some(ScoreSeries::new(dates.clone(), scores)?);
            metadata.weights = Some(normalized);
            values
        }
        AggregationMethod::Majority {
            threshold,
            exit_threshold,
        } => match threshold {
            None => rows
                .iter()
                .map(|row| Tally::of(row.iter().copied()).plurality())
                .collect(),
            Some(t) => {
                let exit = exit_threshold.unwrap_or(t / 2.0);
                check_thresholds(*t, exit)?;
                majority_with_hysteresis(&rows, *t, exit)
            }
        },
        AggregationMethod::Custom { expression } => {
            let expr = vote_expression::parse(expression)?;
            let names: Vec<&str> = signals.iter().map(|s| s.name.as_str()).collect();
            let (values, recovered) = custom(&expr, &names, &rows, &dates);
            metadata.recovered_dates = recovered;
            values
        }
    };

    tracing::debug!(
        method = metadata.method,
        strategies = metadata.strategies.len(),
        dates = metadata.dates,
        recovered = metadata.recovered_dates,
        "combined signals"
    );

    Ok((PositionSeries::new(dates, values)?, metadata))
}

fn aligned_rows(signals: &[NamedSignal], dates: &[NaiveDate]) -> Vec<Vec<Position>> {
    dates
        .iter()
        .map(|&d| {
            signals
                .iter()
                .map(|s| s.positions.value_at(d).unwrap_or_default())
                .collect()
        })
        .collect()
}

fn normalize_weights(
    signals: &[NamedSignal],
    weights: Option<&HashMap<String, f64>>,
) -> Result<Vec<(String, f64)>, StratlabError> {
    let raw: Vec<(String, f64)> = match weights {
        None => signals.iter().map(|s| (s.name.clone(), 1.0)).collect(),
        Some(map) => signals
            .iter()
            .map(|s| (s.name.clone(), map.get(&s.name).copied().unwrap_or(0.0)))
            .collect(),
    };
    if let Some((name, w)) = raw.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(StratlabError::validation(format!(
            "weight for '{}' must be a non-negative number, got {}",
            name, w
        )));
    }
    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Err(StratlabError::validation(
            "weights must sum to a positive total",
        ));
    }
    Ok(raw.into_iter().map(|(n, w)| (n, w / total)).collect())
}

fn discretize(score: f64) -> Position {
    if score > WEIGHTED_SCORE_THRESHOLD {
        Position::Long
    } else if score < -WEIGHTED_SCORE_THRESHOLD {
        Position::Short
    } else {
        Position::Cash
    }
}

fn check_thresholds(threshold: f64, exit: f64) -> Result<(), StratlabError> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(StratlabError::validation(format!(
            "majority threshold must be in (0, 1], got {}",
            threshold
        )));
    }
    if !(0.0..=threshold).contains(&exit) {
        return Err(StratlabError::validation(format!(
            "exit threshold must be in [0, {}], got {}",
            threshold, exit
        )));
    }
    Ok(())
}

fn majority_with_hysteresis(rows: &[Vec<Position>], threshold: f64, exit: f64) -> Vec<Position> {
    let mut state = Position::Cash;
    rows.iter()
        .map(|row| {
            let tally = Tally::of(row.iter().copied());
            let n = row.len() as f64;
            let long_ratio = tally.long as f64 / n;
            let short_ratio = tally.short as f64 / n;

            state = if long_ratio >= threshold && long_ratio > short_ratio {
                Position::Long
            } else if short_ratio >= threshold && short_ratio > long_ratio {
                Position::Short
            } else {
                match state {
                    Position::Long if long_ratio >= exit => Position::Long,
                    Position::Short if short_ratio >= exit => Position::Short,
                    _ => Position::Cash,
                }
            };
            state
        })
        .collect()
}

fn custom(
    expr: &VoteExpr,
    names: &[&str],
    rows: &[Vec<Position>],
    dates: &[NaiveDate],
) -> (Vec<Position>, usize) {
    let referenced = expr.strategies();
    let mut recovered = 0usize;

    let values = rows
        .iter()
        .zip(dates)
        .map(|(row, date)| {
            let positions: HashMap<&str, Position> =
                names.iter().copied().zip(row.iter().copied()).collect();
            match expr.eval(&positions) {
                Ok(true) => {
                    let tally = Tally::of(
                        referenced
                            .iter()
                            .filter_map(|name| positions.get(name).copied()),
                    );
                    if tally.short > tally.long {
                        Position::Short
                    } else {
                        Position::Long
                    }
                }
                Ok(false) => Position::Cash,
                Err(missing) => {
                    recovered += 1;
                    tracing::debug!(%date, strategy = %missing, "custom aggregation failed, using CASH");
                    Position::Cash
                }
            }
        })
        .collect();

    if recovered > 0 {
        tracing::warn!(
            recovered,
            expression = %expr,
            "custom aggregation fell back to CASH on some dates"
        );
    }
    (values, recovered)
}
