//! Backtest pipeline: conditions -> position signal -> simulation -> metrics.

use super::aggregate::{self, AggregationMetadata, AggregationMethod, NamedSignal};
use super::error::StratlabError;
use super::ledger::{EquityPoint, RoundTripTrade, Trade};
use super::metrics::{Metrics, MetricsConfig};
use super::price::PriceBar;
use super::series::{ConditionSet, PositionSeries};
use super::signal::{StrategyRules, synthesize};
use super::simulator::{self, SimulationConfig};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BacktestConfig {
    pub simulation: SimulationConfig,
    pub metrics: MetricsConfig,
}

/// Where a run's position signal comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPlan {
    Single(StrategyRules),
    Aggregate {
        strategies: Vec<StrategyRules>,
        method: AggregationMethod,
    },
}

impl SignalPlan {
    pub fn strategies(&self) -> &[StrategyRules] {
        match self {
            SignalPlan::Single(rules) => std::slice::from_ref(rules),
            SignalPlan::Aggregate { strategies, .. } => strategies,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BacktestResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub trade_log: Vec<RoundTripTrade>,
    pub metrics: Metrics,
    pub aggregation: Option<AggregationMetadata>,
}

/// Derive the position signal for `plan` from the available conditions.
pub fn build_signal(
    plan: &SignalPlan,
    conditions: &ConditionSet,
) -> Result<(PositionSeries, Option<AggregationMetadata>), StratlabError> {
    match plan {
        SignalPlan::Single(rules) => Ok((synthesize(rules, conditions)?, None)),
        SignalPlan::Aggregate { strategies, method } => {
            let signals = strategies
                .iter()
                .map(|rules| Ok(NamedSignal::new(rules.name.clone(), synthesize(rules, conditions)?)))
                .collect::<Result<Vec<_>, StratlabError>>()?;
            let (positions, metadata) = aggregate::combine(&signals, method)?;
            Ok((positions, Some(metadata)))
        }
    }
}

/// Simulate a ready-made signal and compute its metrics.
pub fn run_backtest(
    bars: &[PriceBar],
    signal: &PositionSeries,
    config: &BacktestConfig,
) -> Result<BacktestResult, StratlabError> {
    let output = simulator::run(bars, signal, &config.simulation)?;
    let metrics = Metrics::compute(&output, &config.metrics);
    Ok(BacktestResult {
        equity_curve: output.equity_curve,
        trades: output.trades,
        trade_log: output.round_trips,
        metrics,
        aggregation: None,
    })
}

/// Full pipeline for one plan over one market.
pub fn run_plan(
    bars: &[PriceBar],
    conditions: &ConditionSet,
    plan: &SignalPlan,
    config: &BacktestConfig,
) -> Result<BacktestResult, StratlabError> {
    let (signal, aggregation) = build_signal(plan, conditions)?;
    let mut result = run_backtest(bars, &signal, config)?;
    result.aggregation = aggregation;
    Ok(result)
}
