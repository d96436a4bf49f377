//! Boolean expression AST over named conditions.
//!
//! The tree is a closed union: a leaf naming a condition series, or a binary
//! AND/OR node. Trees are immutable once built by the parser.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Condition(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn condition(name: impl Into<String>) -> Self {
        Expr::Condition(name.into())
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    /// Distinct condition names referenced by the expression, sorted.
    pub fn names(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Condition(name) => {
                out.insert(name.as_str());
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_names(out);
                r.collect_names(out);
            }
        }
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        match self {
            Expr::Condition(_) => 1,
            Expr::And(l, r) | Expr::Or(l, r) => 1 + l.height().max(r.height()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Condition(name) => write!(f, "{}", name),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_fully_parenthesized() {
        let e = Expr::or(
            Expr::condition("a"),
            Expr::and(Expr::condition("b"), Expr::condition("c")),
        );
        assert_eq!(e.to_string(), "(a OR (b AND c))");
    }

    #[test]
    fn names_are_distinct_and_sorted() {
        let e = Expr::and(
            Expr::or(Expr::condition("zeta"), Expr::condition("alpha")),
            Expr::condition("zeta"),
        );
        let names: Vec<&str> = e.names().into_iter().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn height() {
        assert_eq!(Expr::condition("a").height(), 1);
        let e = Expr::and(
            Expr::condition("a"),
            Expr::or(Expr::condition("b"), Expr::condition("c")),
        );
        assert_eq!(e.height(), 3);
    }
}
