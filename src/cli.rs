//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::aggregate::AggregationMethod;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult, SignalPlan};
use crate::domain::config_validation::{
    AGGREGATE_SECTION, get_non_empty, get_number, has_aggregate, parse_list, parse_weights,
    strategy_section, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::StratlabError;
use crate::domain::expression_parser;
use crate::domain::metrics::{DEFAULT_VAR_CONFIDENCE, MetricsConfig};
use crate::domain::signal::{StrategyRules, StrategyType};
use crate::domain::simulator::{DEFAULT_FEE_RATE, FeeConvention, SimulationConfig};
use crate::domain::vote_expression;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, MarketData};
use crate::ports::report_port::ReportPort;

const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;

#[derive(Parser, Debug)]
#[command(name = "stratlab", about = "Boolean-condition strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for CSV reports
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Check a condition expression against a list of names
    Validate {
        #[arg(short, long)]
        expression: String,
        /// Comma-separated condition names
        #[arg(short, long, default_value = "")]
        names: String,
    },
    /// Validate a configuration and its expressions without simulating
    Check {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            symbol,
        } => run_backtest(&config, output.as_ref(), symbol.as_deref()),
        Command::Validate { expression, names } => run_validate(&expression, &names),
        Command::Check { config, symbol } => run_check(&config, symbol.as_deref()),
    }
}

fn fail(err: &StratlabError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// `[strategy.<name>]` sections that the aggregate does not list.
pub fn unused_member_sections(adapter: &FileConfigAdapter, plan: &SignalPlan) -> Vec<String> {
    let SignalPlan::Aggregate { strategies, .. } = plan else {
        return Vec::new();
    };
    adapter
        .member_strategies()
        .into_iter()
        .filter(|name| !strategies.iter().any(|r| r.name.eq_ignore_ascii_case(name)))
        .collect()
}

/// Build run parameters from an already validated `[backtest]` section.
pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, StratlabError> {
    let fee_convention = match get_non_empty(config, "backtest", "fee_convention") {
        None => FeeConvention::default(),
        Some(s) => s.parse().map_err(|reason| StratlabError::ConfigInvalid {
            section: "backtest".into(),
            key: "fee_convention".into(),
            reason,
        })?,
    };

    Ok(BacktestConfig {
        simulation: SimulationConfig {
            initial_capital: config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL),
            fee_rate: config.get_double("backtest", "fee_rate", DEFAULT_FEE_RATE),
            fee_convention,
        },
        metrics: MetricsConfig {
            risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
            var_confidence: config.get_double("backtest", "var_confidence", DEFAULT_VAR_CONFIDENCE),
        },
    })
}

fn read_rules(
    config: &dyn ConfigPort,
    section: &str,
    name: String,
) -> Result<StrategyRules, StratlabError> {
    let strategy_type = match get_non_empty(config, section, "type") {
        None => StrategyType::default(),
        Some(s) => s.parse().map_err(|reason| StratlabError::ConfigInvalid {
            section: section.to_string(),
            key: "type".into(),
            reason,
        })?,
    };
    Ok(StrategyRules {
        name,
        strategy_type,
        long: get_non_empty(config, section, "long"),
        cash: get_non_empty(config, section, "cash"),
        short: get_non_empty(config, section, "short"),
        expression: get_non_empty(config, section, "expression"),
    })
}

fn build_aggregation_method(config: &dyn ConfigPort) -> Result<AggregationMethod, StratlabError> {
    let section = AGGREGATE_SECTION;
    let invalid = |key: &str, reason: String| StratlabError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason,
    };
    let method = get_non_empty(config, section, "method")
        .ok_or_else(|| StratlabError::ConfigMissing {
            section: section.into(),
            key: "method".into(),
        })?
        .to_lowercase();

    match method.as_str() {
        "weighted" => {
            let weights = get_non_empty(config, section, "weights")
                .map(|text| parse_weights(&text).map_err(|r| invalid("weights", r)))
                .transpose()?;
            Ok(AggregationMethod::Weighted { weights })
        }
        "majority" => Ok(AggregationMethod::Majority {
            threshold: get_number(config, section, "threshold")?,
            exit_threshold: get_number(config, section, "exit_threshold")?,
        }),
        "custom" => {
            let expression = get_non_empty(config, section, "expression").ok_or_else(|| {
                StratlabError::ConfigMissing {
                    section: section.into(),
                    key: "expression".into(),
                }
            })?;
            Ok(AggregationMethod::Custom { expression })
        }
        other => Err(invalid("method", format!("unknown method '{}'", other))),
    }
}

/// Build the signal plan from `[strategy]`, or from `[aggregate]` plus one
/// `[strategy.<name>]` section per member.
pub fn build_signal_plan(config: &dyn ConfigPort) -> Result<SignalPlan, StratlabError> {
    if !has_aggregate(config) {
        let name = config
            .get_string("strategy", "name")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Unnamed".to_string());
        return Ok(SignalPlan::Single(read_rules(config, "strategy", name)?));
    }

    let names = get_non_empty(config, AGGREGATE_SECTION, "strategies")
        .map(|s| parse_list(&s))
        .unwrap_or_default();
    let strategies = names
        .into_iter()
        .map(|name| {
            let section = strategy_section(&name);
            read_rules(config, &section, name)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SignalPlan::Aggregate {
        strategies,
        method: build_aggregation_method(config)?,
    })
}

/// Display name of the configured plan.
pub fn plan_name(config: &dyn ConfigPort, plan: &SignalPlan) -> String {
    match plan {
        SignalPlan::Single(rules) => rules.name.clone(),
        SignalPlan::Aggregate { method, .. } => get_non_empty(config, AGGREGATE_SECTION, "name")
            .unwrap_or_else(|| format!("{} aggregate", method.name())),
    }
}

pub fn resolve_symbol(
    symbol_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<String, StratlabError> {
    if let Some(s) = symbol_override.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(s.to_string());
    }
    get_non_empty(config, "backtest", "symbol").ok_or_else(|| StratlabError::ConfigMissing {
        section: "backtest".into(),
        key: "symbol".into(),
    })
}

/// Data directory from `[backtest] data_dir`; relative paths resolve
/// against the config file's directory.
pub fn resolve_data_dir(config_path: &Path, config: &dyn ConfigPort) -> PathBuf {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    match get_non_empty(config, "backtest", "data_dir") {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            if dir.is_absolute() { dir } else { base.join(dir) }
        }
        None => base.to_path_buf(),
    }
}

/// Parse every expression in `plan` against `names`, printing a caret
/// diagnostic for the first failure.
pub fn check_plan_expressions(plan: &SignalPlan, names: &[&str]) -> Result<(), StratlabError> {
    for rules in plan.strategies() {
        for (field, text) in rules.expressions() {
            match expression_parser::parse(text, names) {
                Ok(expr) => eprintln!("  {}.{}: {}", rules.name, field, expr),
                Err(e) => {
                    eprintln!(
                        "error: failed to parse {} of strategy '{}':\n{}",
                        field,
                        rules.name,
                        e.display_with_context(text)
                    );
                    return Err(e.into());
                }
            }
        }
    }

    if let SignalPlan::Aggregate {
        method: AggregationMethod::Custom { expression },
        ..
    } = plan
    {
        match vote_expression::parse(expression) {
            Ok(expr) => {
                eprintln!("  aggregate.expression: {}", expr);
                let members: Vec<&str> = plan.strategies().iter().map(|r| r.name.as_str()).collect();
                for unknown in expr.strategies().into_iter().filter(|s| !members.contains(s)) {
                    tracing::warn!(strategy = unknown, "custom expression references an unlisted strategy");
                    eprintln!("warning: '{}' is not an aggregated strategy; affected dates will be CASH", unknown);
                }
            }
            Err(e) => {
                eprintln!(
                    "error: failed to parse aggregate expression:\n{}",
                    e.display_with_context(expression)
                );
                return Err(e.into());
            }
        }
    }
    Ok(())
}

struct Prepared {
    plan: SignalPlan,
    name: String,
    bt_config: BacktestConfig,
    symbol: String,
    data: MarketData,
}

fn prepare(config_path: &Path, symbol_override: Option<&str>) -> Result<Prepared, ExitCode> {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    // Stage 2: Validate config
    validate_backtest_config(&adapter).map_err(|e| fail(&e))?;
    validate_strategy_config(&adapter).map_err(|e| fail(&e))?;

    // Stage 3: Build plan and run parameters
    let plan = build_signal_plan(&adapter).map_err(|e| fail(&e))?;
    let name = plan_name(&adapter, &plan);
    let bt_config = build_backtest_config(&adapter).map_err(|e| fail(&e))?;
    bt_config.simulation.validate().map_err(|e| fail(&e))?;
    eprintln!("Strategy: {}", name);
    for unused in unused_member_sections(&adapter, &plan) {
        tracing::warn!(section = %strategy_section(&unused), source = adapter.source(), "strategy section not aggregated");
        eprintln!("warning: [{}] is not listed in [aggregate] strategies", strategy_section(&unused));
    }

    // Stage 4: Load market data
    let symbol = resolve_symbol(symbol_override, &adapter).map_err(|e| fail(&e))?;
    let data_dir = resolve_data_dir(config_path, &adapter);
    eprintln!("Loading {} from {}", symbol, data_dir.display());
    let data = CsvAdapter::new(data_dir)
        .fetch_market_data(&symbol)
        .map_err(|e| fail(&e))?;
    eprintln!(
        "  {} bars, {} conditions ({} to {})",
        data.bars.len(),
        data.conditions.len(),
        data.bars.first().map(|b| b.date.to_string()).unwrap_or_default(),
        data.bars.last().map(|b| b.date.to_string()).unwrap_or_default(),
    );

    // Stage 5: Parse expressions against the available conditions
    eprintln!("Parsing expressions:");
    check_plan_expressions(&plan, &data.condition_names()).map_err(|e| ExitCode::from(&e))?;

    Ok(Prepared {
        plan,
        name,
        bt_config,
        symbol,
        data,
    })
}

fn run_backtest(
    config_path: &Path,
    output_path: Option<&PathBuf>,
    symbol_override: Option<&str>,
) -> ExitCode {
    let prepared = match prepare(config_path, symbol_override) {
        Ok(p) => p,
        Err(code) => return code,
    };

    // Stage 6: Simulate
    eprintln!(
        "Running backtest: {} on {} bars",
        prepared.symbol,
        prepared.data.bars.len()
    );
    let result = match backtest_engine::run_plan(
        &prepared.data.bars,
        &prepared.data.conditions,
        &prepared.plan,
        &prepared.bt_config,
    ) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    // Stage 7: Console summary
    print_summary(&prepared.name, &result);

    // Stage 8: Reports
    if let Some(dir) = output_path {
        if let Err(e) = CsvReportAdapter::new().write(&result, &prepared.name, dir) {
            return fail(&e);
        }
        eprintln!("\nReports written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

fn print_summary(name: &str, result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== {} ===", name);
    eprintln!("Final Value:      {:.2}", m.final_value);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("CAGR:             {:.2}%", m.cagr * 100.0);
    eprintln!("Volatility:       {:.2}%", m.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Omega Ratio:      {:.2}", m.omega_ratio);
    eprintln!("Calmar Ratio:     {:.2}", m.calmar_ratio);
    eprintln!("Max Drawdown:     {:.1}%", m.drawdown.max_drawdown * 100.0);
    if let (Some(peak), Some(trough)) = (m.drawdown.peak_date, m.drawdown.trough_date) {
        eprintln!("  {} to {} ({} days)", peak, trough, m.drawdown.duration_days);
    }
    eprintln!("VaR / CVaR:       {:.2}% / {:.2}%", m.value_at_risk * 100.0, m.conditional_value_at_risk * 100.0);
    eprintln!("Skew / Kurtosis:  {:.2} / {:.2}", m.skewness, m.kurtosis);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Round Trips:      {}", m.round_trips);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Round-Trip Wins:  {:.1}%", m.round_trip_win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    eprintln!("Commission:       {:.2}", m.total_commission);
    eprintln!("Exposure:         {:.1}%", m.exposure * 100.0);

    if let Some(agg) = &result.aggregation {
        eprintln!(
            "\nAggregation: {} over {} ({} dates)",
            agg.method,
            agg.strategies.join(", "),
            agg.dates
        );
        if let Some(weights) = &agg.weights {
            for (name, w) in weights {
                eprintln!("  {}: {:.3}", name, w);
            }
        }
        if agg.recovered_dates > 0 {
            eprintln!("  {} dates fell back to CASH", agg.recovered_dates);
        }
    }
}

fn run_validate(expression: &str, names: &str) -> ExitCode {
    let names = parse_list(names);
    let available: Vec<&str> = names.iter().map(String::as_str).collect();
    match expression_parser::parse(expression, &available) {
        Ok(expr) => {
            eprintln!("Expression is valid: {}", expr);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e.display_with_context(expression));
            (&StratlabError::from(e)).into()
        }
    }
}

fn run_check(config_path: &Path, symbol_override: Option<&str>) -> ExitCode {
    match prepare(config_path, symbol_override) {
        Ok(prepared) => {
            eprintln!(
                "\nConfiguration is valid: {} strategies on {}",
                prepared.plan.strategies().len(),
                prepared.symbol
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(ini: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(ini).unwrap()
    }

    #[test]
    fn backtest_config_defaults() {
        let c = build_backtest_config(&make_config("[backtest]\nsymbol = X\n")).unwrap();
        assert_eq!(c.simulation.initial_capital, DEFAULT_INITIAL_CAPITAL);
        assert_eq!(c.simulation.fee_rate, DEFAULT_FEE_RATE);
        assert_eq!(c.simulation.fee_convention, FeeConvention::Absorbed);
        assert_eq!(c.metrics.var_confidence, DEFAULT_VAR_CONFIDENCE);
    }

    #[test]
    fn backtest_config_reads_values() {
        let c = build_backtest_config(&make_config(
            "[backtest]\ninitial_capital = 5000\nfee_rate = 0.002\nfee_convention = legacy\nrisk_free_rate = 0.03\n",
        ))
        .unwrap();
        assert_eq!(c.simulation.initial_capital, 5000.0);
        assert_eq!(c.simulation.fee_rate, 0.002);
        assert_eq!(c.simulation.fee_convention, FeeConvention::Legacy);
        assert_eq!(c.metrics.risk_free_rate, 0.03);
    }

    #[test]
    fn single_plan_from_strategy_section() {
        let plan = build_signal_plan(&make_config(
            "[strategy]\nname = Trend\ntype = long_short\nlong = up\nshort = down\n",
        ))
        .unwrap();
        match plan {
            SignalPlan::Single(rules) => {
                assert_eq!(rules.name, "Trend");
                assert_eq!(rules.strategy_type, StrategyType::LongShort);
                assert_eq!(rules.short.as_deref(), Some("down"));
                assert_eq!(rules.cash, None);
            }
            other => panic!("expected single plan, got {other:?}"),
        }
    }

    #[test]
    fn aggregate_plan_reads_member_sections() {
        let plan = build_signal_plan(&make_config(
            "[aggregate]\nmethod = weighted\nstrategies = fast, slow\nweights = fast:3, slow:1\n\
             [strategy.fast]\nlong = up\n[strategy.slow]\nexpression = up OR down\n",
        ))
        .unwrap();
        match plan {
            SignalPlan::Aggregate { strategies, method } => {
                assert_eq!(strategies.len(), 2);
                assert_eq!(strategies[0].name, "fast");
                assert_eq!(strategies[1].expression.as_deref(), Some("up OR down"));
                match method {
                    AggregationMethod::Weighted { weights: Some(w) } => {
                        assert_eq!(w["fast"], 3.0);
                    }
                    other => panic!("expected weights, got {other:?}"),
                }
            }
            other => panic!("expected aggregate plan, got {other:?}"),
        }
    }

    #[test]
    fn majority_method_reads_thresholds() {
        let method = build_aggregation_method(&make_config(
            "[aggregate]\nmethod = Majority\nthreshold = 0.6\n",
        ))
        .unwrap();
        assert_eq!(
            method,
            AggregationMethod::Majority {
                threshold: Some(0.6),
                exit_threshold: None
            }
        );
    }

    #[test]
    fn symbol_override_wins() {
        let c = make_config("[backtest]\nsymbol = BTC\n");
        assert_eq!(resolve_symbol(Some("ETH"), &c).unwrap(), "ETH");
        assert_eq!(resolve_symbol(None, &c).unwrap(), "BTC");
        assert!(matches!(
            resolve_symbol(None, &make_config("[backtest]\n")),
            Err(StratlabError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn data_dir_relative_to_config() {
        let c = make_config("[backtest]\ndata_dir = data\n");
        assert_eq!(
            resolve_data_dir(Path::new("/etc/strat/run.ini"), &c),
            PathBuf::from("/etc/strat/data")
        );
        let c = make_config("[backtest]\ndata_dir = /srv/prices\n");
        assert_eq!(
            resolve_data_dir(Path::new("/etc/strat/run.ini"), &c),
            PathBuf::from("/srv/prices")
        );
    }
}
