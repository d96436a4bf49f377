//! CSV report writer.
//!
//! Writes four files into the output directory, prefixed with a slug of the
//! strategy name: `_equity.csv`, `_trades.csv`, `_round_trips.csv` and
//! `_metrics.csv`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::StratlabError;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn slug(name: &str) -> String {
    let s: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() { "strategy".to_string() } else { s }
}

fn csv_error(path: &Path, err: csv::Error) -> StratlabError {
    StratlabError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        err
    )))
}

/// Paths written by [`CsvReportAdapter`] for a strategy name.
pub fn report_paths(dir: &Path, strategy_name: &str) -> [PathBuf; 4] {
    let stem = slug(strategy_name);
    ["equity", "trades", "round_trips", "metrics"]
        .map(|kind| dir.join(format!("{}_{}.csv", stem, kind)))
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<(), StratlabError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(header).map_err(|e| csv_error(path, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_path: &Path,
    ) -> Result<(), StratlabError> {
        fs::create_dir_all(output_path)?;
        let [equity_path, trades_path, round_trips_path, metrics_path] =
            report_paths(output_path, strategy_name);

        write_rows(
            &equity_path,
            &[
                "date",
                "portfolio_value",
                "price",
                "position",
                "capital",
                "shares",
                "daily_return",
            ],
            result.equity_curve.iter().map(|p| {
                vec![
                    p.date.to_string(),
                    p.portfolio_value.to_string(),
                    p.price.to_string(),
                    p.position.as_i8().to_string(),
                    p.capital.to_string(),
                    p.shares.to_string(),
                    p.daily_return.to_string(),
                ]
            }),
        )?;

        write_rows(
            &trades_path,
            &[
                "date",
                "kind",
                "price",
                "quantity",
                "value",
                "commission",
                "capital_after",
                "position_after",
            ],
            result.trades.iter().map(|t| {
                vec![
                    t.date.to_string(),
                    t.kind.to_string(),
                    t.price.to_string(),
                    t.quantity.to_string(),
                    t.value.to_string(),
                    t.commission.to_string(),
                    t.capital_after.to_string(),
                    t.position_after.to_string(),
                ]
            }),
        )?;

        write_rows(
            &round_trips_path,
            &[
                "entry_date",
                "exit_date",
                "direction",
                "entry_price",
                "exit_price",
                "return_pct",
                "duration_days",
            ],
            result.trade_log.iter().map(|rt| {
                vec![
                    rt.entry_date.to_string(),
                    rt.exit_date.to_string(),
                    rt.direction.to_string(),
                    rt.entry_price.to_string(),
                    rt.exit_price.to_string(),
                    rt.return_pct.to_string(),
                    rt.duration_days.to_string(),
                ]
            }),
        )?;

        let m = &result.metrics;
        let date_or_blank = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        let metrics: Vec<(&str, String)> = vec![
            ("total_return", m.total_return.to_string()),
            ("cagr", m.cagr.to_string()),
            ("volatility", m.volatility.to_string()),
            ("sharpe_ratio", m.sharpe_ratio.to_string()),
            ("sortino_ratio", m.sortino_ratio.to_string()),
            ("omega_ratio", m.omega_ratio.to_string()),
            ("calmar_ratio", m.calmar_ratio.to_string()),
            ("max_drawdown", m.drawdown.max_drawdown.to_string()),
            ("drawdown_peak", date_or_blank(m.drawdown.peak_date)),
            ("drawdown_trough", date_or_blank(m.drawdown.trough_date)),
            ("drawdown_days", m.drawdown.duration_days.to_string()),
            ("value_at_risk", m.value_at_risk.to_string()),
            ("conditional_value_at_risk", m.conditional_value_at_risk.to_string()),
            ("skewness", m.skewness.to_string()),
            ("kurtosis", m.kurtosis.to_string()),
            ("win_rate", m.win_rate.to_string()),
            ("round_trip_win_rate", m.round_trip_win_rate.to_string()),
            ("profit_factor", m.profit_factor.to_string()),
            ("avg_trade_duration", m.avg_trade_duration.to_string()),
            ("total_trades", m.total_trades.to_string()),
            ("round_trips", m.round_trips.to_string()),
            ("final_value", m.final_value.to_string()),
            ("total_commission", m.total_commission.to_string()),
            ("exposure", m.exposure.to_string()),
        ];
        write_rows(
            &metrics_path,
            &["metric", "value"],
            metrics.into_iter().map(|(k, v)| vec![k.to_string(), v]),
        )?;

        tracing::debug!(dir = %output_path.display(), strategy = strategy_name, "reports written");
        Ok(())
    }
}
