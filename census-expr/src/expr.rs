//! Column predicate AST.
#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::literal::Literal;

/// Logical expression over column predicates.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Pred(Filter),
    /// Constant truth value (`TRUE` / `FALSE` in the filter text).
    Literal(bool),
}

impl Expr {
    /// Build an AND of filters.
    #[inline]
    pub fn all_of(fs: Vec<Filter>) -> Expr {
        Expr::And(fs.into_iter().map(Expr::Pred).collect())
    }

    /// Build an OR of filters.
    #[inline]
    pub fn any_of(fs: Vec<Filter>) -> Expr {
        Expr::Or(fs.into_iter().map(Expr::Pred).collect())
    }

    /// Wrap an expression in a logical NOT.
    #[allow(clippy::should_implement_trait)]
    #[inline]
    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }

    /// Names of every column this expression reads, sorted and de-duplicated.
    pub fn columns(&self) -> Vec<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out.into_iter().collect()
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::Pred(filter) => {
                out.insert(filter.column.clone());
            }
            Expr::Literal(_) => {}
        }
    }
}

/// Single predicate against a named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Operator,
}

impl Filter {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self {
            column: column.into(),
            op: Operator::Compare {
                op,
                value: value.into(),
            },
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Literal>) -> Self {
        Self {
            column: column.into(),
            op: Operator::In {
                values,
                negated: false,
            },
        }
    }
}

/// Comparison/matching operators applied to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Compare { op: CompareOp, value: Literal },
    In { values: Vec<Literal>, negated: bool },
    IsNull { negated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Render the operator as a human-readable symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    /// The operator that keeps the comparison true when its operands swap
    /// sides (`5 < x` is `x > 5`).
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }
}
