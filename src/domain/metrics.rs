//! Performance metrics over a simulation's equity curve and trade ledger.
//!
//! Daily-return statistics annualize with 252 trading days; CAGR uses
//! calendar time (365.25-day years). Ratios with a zero denominator are 0
//! unless documented as infinite.

use super::ledger::{EquityPoint, RoundTripTrade, Trade, TradeKind};
use super::simulator::SimulationOutput;
use chrono::NaiveDate;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

pub const DEFAULT_VAR_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub risk_free_rate: f64,
    pub var_confidence: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            risk_free_rate: 0.0,
            var_confidence: DEFAULT_VAR_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Drawdown {
    /// Largest peak-to-trough decline as a fraction, always <= 0.
    pub max_drawdown: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub omega_ratio: f64,
    pub calmar_ratio: f64,
    pub drawdown: Drawdown,
    pub value_at_risk: f64,
    pub conditional_value_at_risk: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub win_rate: f64,
    pub round_trip_win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_duration: f64,
    pub total_trades: usize,
    pub round_trips: usize,
    pub final_value: f64,
    pub total_commission: f64,
    pub exposure: f64,
}

impl Metrics {
    pub fn compute(output: &SimulationOutput, config: &MetricsConfig) -> Self {
        let curve = &output.equity_curve;
        let initial = output.initial_capital;
        let final_value = output.final_value();
        let returns = daily_returns(curve);

        let cagr = match (curve.first(), curve.last()) {
            (Some(first), Some(last)) => cagr(initial, final_value, first.date, last.date),
            _ => 0.0,
        };
        let drawdown = max_drawdown(curve);
        let var = value_at_risk(&returns, config.var_confidence);

        let exposure = if curve.is_empty() {
            0.0
        } else {
            curve.iter().filter(|p| p.position.is_invested()).count() as f64 / curve.len() as f64
        };

        let avg_trade_duration = if output.round_trips.is_empty() {
            0.0
        } else {
            output
                .round_trips
                .iter()
                .map(|rt| rt.duration_days as f64)
                .sum::<f64>()
                / output.round_trips.len() as f64
        };

        Metrics {
            total_return: total_return(initial, final_value),
            cagr,
            volatility: volatility(&returns),
            sharpe_ratio: sharpe_ratio(&returns, config.risk_free_rate),
            sortino_ratio: sortino_ratio(&returns, config.risk_free_rate),
            omega_ratio: omega_ratio(&returns),
            calmar_ratio: calmar_ratio(cagr, drawdown.max_drawdown),
            drawdown,
            value_at_risk: var,
            conditional_value_at_risk: conditional_value_at_risk(&returns, config.var_confidence),
            skewness: skewness(&returns),
            kurtosis: kurtosis(&returns),
            win_rate: win_rate(&output.trades),
            round_trip_win_rate: round_trip_win_rate(&output.round_trips),
            profit_factor: profit_factor(&output.round_trips),
            avg_trade_duration,
            total_trades: output.trades.len(),
            round_trips: output.round_trips.len(),
            final_value,
            total_commission: output.trades.iter().map(|t| t.commission).sum(),
            exposure,
        }
    }
}

/// Daily returns from the second bar on; the first bar has no prior value.
pub fn daily_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve.iter().skip(1).map(|p| p.daily_return).collect()
}

pub fn total_return(initial: f64, final_value: f64) -> f64 {
    if initial > 0.0 {
        final_value / initial - 1.0
    } else {
        0.0
    }
}

pub fn cagr(initial: f64, final_value: f64, start: NaiveDate, end: NaiveDate) -> f64 {
    let days = (end - start).num_days();
    if days <= 0 || initial <= 0.0 {
        return 0.0;
    }
    if final_value <= 0.0 {
        return -1.0;
    }
    let years = days as f64 / DAYS_PER_YEAR;
    (final_value / initial).powf(1.0 / years) - 1.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn volatility(returns: &[f64]) -> f64 {
    sample_std(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let std = sample_std(returns);
    if std == 0.0 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    (mean(returns) - daily_rf) / std * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let target = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let downside = returns
        .iter()
        .map(|&r| (r - target).min(0.0).powi(2))
        .sum::<f64>()
        / returns.len() as f64;
    let downside_dev = downside.sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    (mean(returns) - target) / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Sum of gains over sum of absolute losses, threshold 0.
pub fn omega_ratio(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r.abs()).sum();
    if losses > 0.0 {
        gains / losses
    } else if gains > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown < 0.0 {
        cagr / max_drawdown.abs()
    } else {
        0.0
    }
}

pub fn max_drawdown(curve: &[EquityPoint]) -> Drawdown {
    let mut result = Drawdown {
        max_drawdown: 0.0,
        peak_date: None,
        trough_date: None,
        duration_days: 0,
    };
    let Some(first) = curve.first() else {
        return result;
    };

    let mut peak = first.portfolio_value;
    let mut peak_date = first.date;
    for point in curve {
        if point.portfolio_value > peak {
            peak = point.portfolio_value;
            peak_date = point.date;
            continue;
        }
        if peak <= 0.0 {
            continue;
        }
        let dd = (point.portfolio_value - peak) / peak;
        if dd < result.max_drawdown {
            result.max_drawdown = dd;
            result.peak_date = Some(peak_date);
            result.trough_date = Some(point.date);
            result.duration_days = (point.date - peak_date).num_days();
        }
    }
    result
}

/// Historical VaR: the `1 - confidence` quantile of returns, linearly
/// interpolated between order statistics.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q = (1.0 - confidence).clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Mean of the returns at or below VaR.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    let var = value_at_risk(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();
    if tail.is_empty() { var } else { mean(&tail) }
}

fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let m = mean(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &v in values {
        let d = v - m;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Bias-adjusted sample skewness; 0 below three observations.
pub fn skewness(returns: &[f64]) -> f64 {
    let n = returns.len();
    if n < 3 {
        return 0.0;
    }
    let (m2, m3, _) = central_moments(returns);
    if m2 == 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    let n = n as f64;
    (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
}

/// Bias-adjusted excess kurtosis; 0 below four observations.
pub fn kurtosis(returns: &[f64]) -> f64 {
    let n = returns.len();
    if n < 4 {
        return 0.0;
    }
    let (m2, _, m4) = central_moments(returns);
    if m2 == 0.0 {
        return 0.0;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    let n = n as f64;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

/// Share of sell fills with a positive value. This counts every long exit
/// with proceeds as a win, regardless of entry price.
pub fn win_rate(trades: &[Trade]) -> f64 {
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.kind == TradeKind::Sell).collect();
    if sells.is_empty() {
        return 0.0;
    }
    sells.iter().filter(|t| t.value > 0.0).count() as f64 / sells.len() as f64
}

pub fn round_trip_win_rate(round_trips: &[RoundTripTrade]) -> f64 {
    if round_trips.is_empty() {
        return 0.0;
    }
    round_trips.iter().filter(|rt| rt.return_pct > 0.0).count() as f64 / round_trips.len() as f64
}

pub fn profit_factor(round_trips: &[RoundTripTrade]) -> f64 {
    let wins: f64 = round_trips
        .iter()
        .filter(|rt| rt.return_pct > 0.0)
        .map(|rt| rt.return_pct)
        .sum();
    let losses: f64 = round_trips
        .iter()
        .filter(|rt| rt.return_pct < 0.0)
        .map(|rt| rt.return_pct.abs())
        .sum();
    if losses > 0.0 {
        wins / losses
    } else if wins > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}
