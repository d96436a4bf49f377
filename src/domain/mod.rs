//! Core domain types and logic.

pub mod error;
pub mod price;
pub mod position;
pub mod series;
pub mod expression;
pub mod expression_parser;
pub mod expression_eval;
pub mod signal;
pub mod vote_expression;
pub mod aggregate;
pub mod ledger;
pub mod simulator;
pub mod metrics;
pub mod backtest;
pub mod config_validation;
