//! Expression evaluation over condition series.
//!
//! Leaves resolve by name in the [`ConditionSet`]; AND/OR combine the child
//! series elementwise. Evaluation is pure: the same tree and conditions always
//! yield the same series.

use crate::domain::error::StratlabError;
use crate::domain::expression::Expr;
use crate::domain::expression_parser;
use crate::domain::series::{ConditionSeries, ConditionSet};

pub fn evaluate(expr: &Expr, conditions: &ConditionSet) -> Result<ConditionSeries, StratlabError> {
    match expr {
        Expr::Condition(name) => conditions
            .get(name)
            .cloned()
            .ok_or_else(|| StratlabError::NameNotFound { name: name.clone() }),
        Expr::And(left, right) => {
            let l = evaluate(left, conditions)?;
            let r = evaluate(right, conditions)?;
            combine(&l, &r, |a, b| a && b)
        }
        Expr::Or(left, right) => {
            let l = evaluate(left, conditions)?;
            let r = evaluate(right, conditions)?;
            combine(&l, &r, |a, b| a || b)
        }
    }
}

fn combine(
    left: &ConditionSeries,
    right: &ConditionSeries,
    op: impl Fn(bool, bool) -> bool,
) -> Result<ConditionSeries, StratlabError> {
    if !left.same_axis(right) {
        return Err(StratlabError::schema(
            "condition series are not aligned to the same dates",
        ));
    }
    let values = left
        .values()
        .iter()
        .zip(right.values())
        .map(|(&a, &b)| op(a, b))
        .collect();
    ConditionSeries::new(left.dates().to_vec(), values)
}

/// Condition names available for parsing, sorted for stable diagnostics.
pub fn condition_names(conditions: &ConditionSet) -> Vec<&str> {
    let mut names: Vec<&str> = conditions.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

/// Parse `text` against the names in `conditions` and evaluate it.
pub fn parse_and_evaluate(
    text: &str,
    conditions: &ConditionSet,
) -> Result<ConditionSeries, StratlabError> {
    let names = condition_names(conditions);
    let expr = expression_parser::parse(text, &names)?;
    evaluate(&expr, conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| {
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
            })
            .collect()
    }

    fn conditions() -> ConditionSet {
        let mut set = ConditionSet::new();
        set.insert(
            "A".into(),
            ConditionSeries::new(dates(3), vec![true, false, true]).unwrap(),
        );
        set.insert(
            "B".into(),
            ConditionSeries::new(dates(3), vec![false, false, true]).unwrap(),
        );
        set
    }

    #[test]
    fn and_or_elementwise() {
        let c = conditions();
        let and = parse_and_evaluate("A AND B", &c).unwrap();
        assert_eq!(and.values(), &[false, false, true]);
        let or = parse_and_evaluate("A OR B", &c).unwrap();
        assert_eq!(or.values(), &[true, false, true]);
    }

    #[test]
    fn leaf_returns_condition_itself() {
        let c = conditions();
        let a = parse_and_evaluate("(A)", &c).unwrap();
        assert_eq!(a, c["A"]);
    }

    #[test]
    fn missing_name_fails_with_name_not_found() {
        let c = conditions();
        let err = evaluate(&Expr::condition("Z"), &c).unwrap_err();
        assert!(matches!(err, StratlabError::NameNotFound { name } if name == "Z"));
    }

    #[test]
    fn misaligned_series_is_schema_error() {
        let mut c = conditions();
        c.insert(
            "C".into(),
            ConditionSeries::new(dates(2), vec![true, true]).unwrap(),
        );
        let err = parse_and_evaluate("A AND C", &c).unwrap_err();
        assert!(matches!(err, StratlabError::Schema { .. }));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let c = conditions();
        let names = condition_names(&c);
        let expr = expression_parser::parse("(A OR B) AND A", &names).unwrap();
        let first = evaluate(&expr, &c).unwrap();
        for _ in 0..5 {
            assert_eq!(evaluate(&expr, &c).unwrap(), first);
        }
    }

    #[test]
    fn names_sorted() {
        assert_eq!(condition_names(&conditions()), vec!["A", "B"]);
    }
}
