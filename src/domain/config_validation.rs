//! Configuration validation.
//!
//! Validates all config fields before any data is loaded or simulated.

use crate::domain::error::StratlabError;
use crate::domain::signal::StrategyType;
use crate::domain::simulator::{FeeConvention, MAX_FEE_RATE, MIN_INITIAL_CAPITAL};
use crate::ports::config_port::ConfigPort;
use std::collections::HashMap;

pub const AGGREGATE_SECTION: &str = "aggregate";

/// Section holding the rules of an aggregated strategy.
pub fn strategy_section(name: &str) -> String {
    format!("strategy.{}", name)
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    validate_initial_capital(config)?;
    validate_fee_rate(config)?;
    validate_fee_convention(config)?;
    validate_risk_free_rate(config)?;
    validate_var_confidence(config)?;
    Ok(())
}

/// Validate `[strategy]`, or `[aggregate]` and its member sections when an
/// aggregation method is configured.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if has_aggregate(config) {
        validate_aggregate(config)
    } else {
        validate_strategy_section(config, "strategy")
    }
}

pub fn has_aggregate(config: &dyn ConfigPort) -> bool {
    config.get_string(AGGREGATE_SECTION, "method").is_some()
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratlabError {
    StratlabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> StratlabError {
    StratlabError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Non-empty trimmed value of a key.
pub fn get_non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read an optional number, rejecting values that do not parse.
pub fn get_number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, StratlabError> {
    match get_non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, format!("'{}' is not a number", s))),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if let Some(value) = get_number(config, "backtest", "initial_capital")? {
        if value < MIN_INITIAL_CAPITAL {
            return Err(invalid(
                "backtest",
                "initial_capital",
                format!("initial_capital must be at least {}", MIN_INITIAL_CAPITAL),
            ));
        }
    }
    Ok(())
}

fn validate_fee_rate(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if let Some(value) = get_number(config, "backtest", "fee_rate")? {
        if !(0.0..MAX_FEE_RATE).contains(&value) {
            return Err(invalid(
                "backtest",
                "fee_rate",
                format!("fee_rate must be in [0, {})", MAX_FEE_RATE),
            ));
        }
    }
    Ok(())
}

fn validate_fee_convention(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if let Some(value) = get_non_empty(config, "backtest", "fee_convention") {
        value
            .parse::<FeeConvention>()
            .map_err(|reason| invalid("backtest", "fee_convention", reason))?;
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if let Some(value) = get_number(config, "backtest", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_var_confidence(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    if let Some(value) = get_number(config, "backtest", "var_confidence")? {
        if !(value > 0.0 && value < 1.0) {
            return Err(invalid(
                "backtest",
                "var_confidence",
                "var_confidence must be strictly between 0 and 1",
            ));
        }
    }
    Ok(())
}

pub fn validate_strategy_section(config: &dyn ConfigPort, section: &str) -> Result<(), StratlabError> {
    let strategy_type = match get_non_empty(config, section, "type") {
        None => StrategyType::default(),
        Some(s) => s
            .parse::<StrategyType>()
            .map_err(|reason| invalid(section, "type", reason))?,
    };

    let long = get_non_empty(config, section, "long");
    let legacy = get_non_empty(config, section, "expression");
    if long.is_none() && legacy.is_none() {
        return Err(missing(section, "long"));
    }
    if strategy_type == StrategyType::LongShort {
        if long.is_none() {
            return Err(missing(section, "long"));
        }
        if get_non_empty(config, section, "short").is_none() {
            return Err(missing(section, "short"));
        }
    }
    Ok(())
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `name:weight, name:weight`.
pub fn parse_weights(text: &str) -> Result<HashMap<String, f64>, String> {
    let mut weights = HashMap::new();
    for entry in parse_list(text) {
        let Some((name, value)) = entry.split_once(':') else {
            return Err(format!("expected name:weight, got '{}'", entry));
        };
        let name = name.trim();
        let weight = value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("weight for '{}' is not a number", name))?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(format!("weight for '{}' must be non-negative", name));
        }
        if weights.insert(name.to_string(), weight).is_some() {
            return Err(format!("weight for '{}' given twice", name));
        }
    }
    Ok(weights)
}

fn validate_aggregate(config: &dyn ConfigPort) -> Result<(), StratlabError> {
    let section = AGGREGATE_SECTION;
    let method = get_non_empty(config, section, "method").ok_or_else(|| missing(section, "method"))?;

    let strategies = get_non_empty(config, section, "strategies")
        .map(|s| parse_list(&s))
        .unwrap_or_default();
    if strategies.is_empty() {
        return Err(missing(section, "strategies"));
    }
    for name in &strategies {
        validate_strategy_section(config, &strategy_section(name))?;
    }

    match method.to_lowercase().as_str() {
        "weighted" => {
            if let Some(text) = get_non_empty(config, section, "weights") {
                let weights = parse_weights(&text).map_err(|r| invalid(section, "weights", r))?;
                if let Some(unknown) = weights.keys().find(|k| !strategies.contains(*k)) {
                    return Err(invalid(
                        section,
                        "weights",
                        format!("'{}' is not listed in strategies", unknown),
                    ));
                }
                if weights.values().sum::<f64>() <= 0.0 {
                    return Err(invalid(section, "weights", "weights must sum to a positive total"));
                }
            }
        }
        "majority" => {
            if let Some(t) = get_number(config, section, "threshold")? {
                if !(t > 0.0 && t <= 1.0) {
                    return Err(invalid(section, "threshold", "threshold must be in (0, 1]"));
                }
                if let Some(exit) = get_number(config, section, "exit_threshold")? {
                    if !(0.0..=t).contains(&exit) {
                        return Err(invalid(
                            section,
                            "exit_threshold",
                            "exit_threshold must be between 0 and threshold",
                        ));
                    }
                }
            }
        }
        "custom" => {
            if get_non_empty(config, section, "expression").is_none() {
                return Err(missing(section, "expression"));
            }
        }
        other => {
            return Err(invalid(
                section,
                "method",
                format!("unknown method '{}' (expected weighted, majority or custom)", other),
            ));
        }
    }
    Ok(())
}
