//! Integration tests for the backtest pipeline.
//!
//! Tests cover:
//! - Full pipeline with a mock data port (no files)
//! - Aggregated plans (weighted, majority with hysteresis, custom)
//! - CSV market data in, CSV reports out
//! - Reference scenarios: doubling price, fee drag on a flat market

mod common;

use approx::assert_relative_eq;
use common::*;
use std::collections::HashMap;
use std::fs;
use stratlab::adapters::csv_adapter::CsvAdapter;
use stratlab::adapters::csv_report_adapter::{CsvReportAdapter, report_paths};
use stratlab::domain::aggregate::{self, AggregationMethod, NamedSignal};
use stratlab::domain::backtest::{BacktestConfig, SignalPlan, run_plan};
use stratlab::domain::error::StratlabError;
use stratlab::domain::ledger::{Direction, TradeKind};
use stratlab::domain::position::Position;
use stratlab::domain::series::PositionSeries;
use stratlab::ports::data_port::DataPort;
use stratlab::ports::report_port::ReportPort;

fn positions(values: &[Position]) -> PositionSeries {
    PositionSeries::new((0..values.len()).map(day).collect(), values.to_vec()).unwrap()
}

mod full_pipeline {
    use super::*;

    #[test]
    fn long_short_pipeline_with_mock_data_port() {
        let port = MockDataPort::new().with_market(
            "BTC",
            generate_bars(&[100.0, 110.0, 110.0, 99.0]),
            conditions(&[
                ("up", &[true, true, false, false]),
                ("down", &[false, false, true, true]),
            ]),
        );
        let data = port.fetch_market_data("BTC").unwrap();
        let plan = SignalPlan::Single(long_short("trend", "up", "down"));

        let result = run_plan(&data.bars, &data.conditions, &plan, &zero_fee_config()).unwrap();

        let kinds: Vec<TradeKind> = result.trades.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TradeKind::Buy, TradeKind::Sell, TradeKind::ShortSell]
        );
        assert_relative_eq!(result.metrics.final_value, 12_100.0, epsilon = 1e-6);
        assert_eq!(result.trade_log.len(), 1);
        assert_eq!(result.trade_log[0].direction, Direction::Long);
        assert_eq!(result.trade_log[0].entry_date, day(0));
        assert_eq!(result.trade_log[0].exit_date, day(2));
        assert_eq!(
            result.equity_curve.last().unwrap().position,
            Position::Short
        );
    }

    #[test]
    fn data_port_errors_surface() {
        let port = MockDataPort::new().with_error("BAD", "broken feed");
        assert!(matches!(
            port.fetch_market_data("BAD"),
            Err(StratlabError::Schema { .. })
        ));
        assert!(matches!(
            port.fetch_market_data("MISSING"),
            Err(StratlabError::NoData { .. })
        ));
    }

    #[test]
    fn unknown_condition_is_a_parse_error() {
        let bars = generate_bars(&[1.0, 2.0]);
        let conds = conditions(&[("up", &[true, false])]);
        let plan = SignalPlan::Single(long_cash("x", "up AND sideways"));
        let err = run_plan(&bars, &conds, &plan, &BacktestConfig::default()).unwrap_err();
        assert!(matches!(err, StratlabError::Parse(_)));
    }

    #[test]
    fn signal_missing_a_bar_date_is_a_schema_error() {
        // conditions cover only the first two of three bars
        let bars = generate_bars(&[1.0, 2.0, 3.0]);
        let conds = conditions(&[("up", &[true, false])]);
        let plan = SignalPlan::Single(long_cash("x", "up"));
        let err = run_plan(&bars, &conds, &plan, &BacktestConfig::default()).unwrap_err();
        assert!(matches!(err, StratlabError::Schema { .. }));
    }
}

mod aggregation {
    use super::*;

    #[test]
    fn weighted_plan_normalizes_and_keeps_scores() {
        let bars = generate_bars(&[100.0, 101.0, 102.0]);
        let conds = conditions(&[
            ("a", &[true, true, false]),
            ("b", &[true, false, false]),
        ]);
        let mut weights = HashMap::new();
        weights.insert("fast".to_string(), 3.0);
        weights.insert("slow".to_string(), 1.0);
        let plan = SignalPlan::Aggregate {
            strategies: vec![long_cash("fast", "a"), long_cash("slow", "b")],
            method: AggregationMethod::Weighted {
                weights: Some(weights),
            },
        };

        let result = run_plan(&bars, &conds, &plan, &zero_fee_config()).unwrap();
        let meta = result.aggregation.unwrap();

        let w = meta.weights.unwrap();
        assert_relative_eq!(w[0].1, 0.75);
        assert_relative_eq!(w[1].1, 0.25);
        let scores = meta.scores.unwrap();
        assert_relative_eq!(scores.values()[0], 1.0);
        assert_relative_eq!(scores.values()[1], 0.75);
        assert_relative_eq!(scores.values()[2], 0.0);

        let held: Vec<Position> = result.equity_curve.iter().map(|p| p.position).collect();
        assert_eq!(held, vec![Position::Long, Position::Long, Position::Cash]);
    }

    #[test]
    fn majority_threshold_holds_through_a_three_way_split() {
        use Position::{Cash, Long, Short};
        let signals = vec![
            NamedSignal::new("a", positions(&[Long, Cash, Long, Long])),
            NamedSignal::new("b", positions(&[Short, Long, Short, Short])),
            NamedSignal::new("c", positions(&[Cash, Long, Short, Cash])),
        ];
        let method = AggregationMethod::Majority {
            threshold: Some(0.5),
            exit_threshold: None,
        };
        let (combined, _) = aggregate::combine(&signals, &method).unwrap();
        // 1/1/1 with no prior state, 2 LONG, 1 LONG/2 SHORT, then 1/1/1 keeps SHORT
        assert_eq!(combined.values(), &[Cash, Long, Short, Short]);
    }

    #[test]
    fn custom_expression_with_unknown_strategy_falls_back_to_cash() {
        let bars = generate_bars(&[10.0, 11.0, 12.0]);
        let conds = conditions(&[("up", &[true, true, true])]);
        let plan = SignalPlan::Aggregate {
            strategies: vec![long_cash("trend", "up")],
            method: AggregationMethod::Custom {
                expression: "ghost == 1 AND trend == 1".into(),
            },
        };
        let result = run_plan(&bars, &conds, &plan, &zero_fee_config()).unwrap();
        assert_eq!(result.aggregation.unwrap().recovered_dates, 3);
        assert!(result.trades.is_empty());
        assert_relative_eq!(result.metrics.final_value, 10_000.0);
    }

    #[test]
    fn custom_expression_direction_follows_referenced_votes() {
        let bars = generate_bars(&[10.0, 11.0]);
        let conds = conditions(&[("up", &[true, false]), ("down", &[false, true])]);
        let plan = SignalPlan::Aggregate {
            strategies: vec![
                long_short("trend", "up", "down"),
                long_short("swing", "up", "down"),
            ],
            method: AggregationMethod::Custom {
                expression: "trend == 1 OR swing == -1".into(),
            },
        };
        let result = run_plan(&bars, &conds, &plan, &zero_fee_config()).unwrap();
        let held: Vec<Position> = result.equity_curve.iter().map(|p| p.position).collect();
        assert_eq!(held, vec![Position::Long, Position::Short]);
    }

    #[test]
    fn custom_syntax_error_is_reported_before_simulation() {
        let bars = generate_bars(&[10.0]);
        let conds = conditions(&[("up", &[true])]);
        let plan = SignalPlan::Aggregate {
            strategies: vec![long_cash("trend", "up")],
            method: AggregationMethod::Custom {
                expression: "trend == 2".into(),
            },
        };
        let err = run_plan(&bars, &conds, &plan, &zero_fee_config()).unwrap_err();
        assert!(matches!(err, StratlabError::Parse(_)));
    }
}

mod csv_round_trip {
    use super::*;

    #[test]
    fn csv_data_in_reports_out() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join("ETH.csv"),
            market_csv(
                &[100.0, 105.0, 103.0, 108.0, 110.0],
                &[("entry", &[true, true, false, true, true])],
            ),
        )
        .unwrap();

        let data = CsvAdapter::new(dir.path().to_path_buf())
            .fetch_market_data("ETH")
            .unwrap();
        assert_eq!(data.condition_names(), vec!["entry"]);

        let plan = SignalPlan::Single(long_cash("Dip Buyer", "entry"));
        let result = run_plan(&data.bars, &data.conditions, &plan, &BacktestConfig::default()).unwrap();
        assert_eq!(result.trades.len(), 3);
        assert_eq!(result.trade_log.len(), 1);

        let out = dir.path().join("reports");
        CsvReportAdapter::new()
            .write(&result, "Dip Buyer", &out)
            .unwrap();

        let [equity, trades, round_trips, metrics] = report_paths(&out, "Dip Buyer");
        let equity_text = fs::read_to_string(equity).unwrap();
        assert_eq!(equity_text.lines().count(), 6);
        assert!(equity_text.starts_with("date,portfolio_value"));
        let trades_text = fs::read_to_string(trades).unwrap();
        assert!(trades_text.contains("BUY"));
        assert!(trades_text.contains("SELL"));
        assert_eq!(fs::read_to_string(round_trips).unwrap().lines().count(), 2);
        let metrics_text = fs::read_to_string(metrics).unwrap();
        assert!(metrics_text.contains("total_return,"));
        assert!(metrics_text.contains("sharpe_ratio,"));
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn doubling_price_always_long_doubles_the_account() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 100.0 / 9.0).collect();
        let bars = generate_bars(&closes);
        let conds = conditions(&[("always", &[true; 10])]);
        let plan = SignalPlan::Single(long_cash("hold", "always"));

        let result = run_plan(&bars, &conds, &plan, &zero_fee_config()).unwrap();

        assert_relative_eq!(result.metrics.final_value, 20_000.0, epsilon = 1e-6);
        assert_relative_eq!(result.metrics.total_return, 1.0, epsilon = 1e-9);
        assert_eq!(result.trades.len(), 1);
        assert_relative_eq!(result.metrics.drawdown.max_drawdown, 0.0);
    }

    #[test]
    fn flat_market_alternating_loses_to_fees() {
        let bars = generate_bars(&[100.0; 6]);
        let conds = conditions(&[("on", &[true, false, true, false, true, false])]);
        let plan = SignalPlan::Single(long_cash("churn", "on"));

        let result = run_plan(&bars, &conds, &plan, &BacktestConfig::default()).unwrap();

        assert_eq!(result.trades.len(), 6);
        assert_eq!(result.trade_log.len(), 3);
        assert_relative_eq!(
            result.metrics.final_value,
            10_000.0 * 0.999_f64.powi(6),
            epsilon = 1e-6
        );
        assert!(result.metrics.total_return < 0.0);
        assert!(result.metrics.total_commission > 0.0);
    }
}
