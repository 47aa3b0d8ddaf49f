//! Parsing of value-filter strings into [`Expr`] trees.
//!
//! The filter text is a SQL boolean expression, parsed with `sqlparser`'s
//! generic dialect and lowered into the column-predicate AST. Only the subset
//! that maps onto a single column compared against literals is accepted.

use std::fmt;

use census_result::{Error, Result};
use sqlparser::ast::{BinaryOperator, Expr as SqlExpr, UnaryOperator, Value, ValueWithSpan};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::expr::{CompareOp, Expr, Filter, Operator};
use crate::literal::Literal;

/// A parsed value filter together with the text it was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueFilter {
    source: String,
    expr: Expr,
}

impl ValueFilter {
    /// Parse `text` into a filter.
    ///
    /// ```
    /// use census_expr::ValueFilter;
    ///
    /// let filter = ValueFilter::parse("tissue IN ('lung', 'brain') AND n_genes >= 200").unwrap();
    /// assert_eq!(filter.columns(), vec!["n_genes", "tissue"]);
    /// assert!(ValueFilter::parse("tissue =").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(text)
            .map_err(|err| Error::predicate_build(format!("failed to parse value filter: {err}")))?;
        let sql_expr = parser
            .parse_expr()
            .map_err(|err| Error::predicate_build(format!("failed to parse value filter: {err}")))?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(Error::PredicateBuild(format!(
                "unexpected trailing input in value filter: {}",
                trailing.token
            )));
        }

        let expr = lower_bool(&sql_expr)?;
        tracing::trace!(filter = text, "parsed value filter");
        Ok(Self {
            source: text.to_string(),
            expr,
        })
    }

    /// Wrap an already-built expression.
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            source: format!("{expr:?}"),
            expr,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Columns the filter needs to read.
    pub fn columns(&self) -> Vec<String> {
        self.expr.columns()
    }
}

impl fmt::Display for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn lower_bool(expr: &SqlExpr) -> Result<Expr> {
    match expr {
        SqlExpr::Nested(inner) => lower_bool(inner),
        SqlExpr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Ok(flatten_and(lower_bool(left)?, lower_bool(right)?)),
            BinaryOperator::Or => Ok(flatten_or(lower_bool(left)?, lower_bool(right)?)),
            other => {
                let op = compare_op(other)?;
                lower_comparison(left, op, right)
            }
        },
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Expr::not(lower_bool(expr)?)),
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => {
            let column = column_name(expr)?;
            let values = list.iter().map(literal).collect::<Result<Vec<_>>>()?;
            Ok(Expr::Pred(Filter {
                column,
                op: Operator::In {
                    values,
                    negated: *negated,
                },
            }))
        }
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let column = column_name(expr)?;
            let range = Expr::all_of(vec![
                Filter::compare(column.clone(), CompareOp::GtEq, literal(low)?),
                Filter::compare(column, CompareOp::LtEq, literal(high)?),
            ]);
            Ok(if *negated { Expr::not(range) } else { range })
        }
        SqlExpr::IsNull(inner) => is_null(inner, false),
        SqlExpr::IsNotNull(inner) => is_null(inner, true),
        SqlExpr::Value(ValueWithSpan {
            value: Value::Boolean(b),
            ..
        }) => Ok(Expr::Literal(*b)),
        other => Err(Error::PredicateBuild(format!(
            "unsupported value filter expression: {other}"
        ))),
    }
}

fn is_null(inner: &SqlExpr, negated: bool) -> Result<Expr> {
    Ok(Expr::Pred(Filter {
        column: column_name(inner)?,
        op: Operator::IsNull { negated },
    }))
}

fn flatten_and(left: Expr, right: Expr) -> Expr {
    let mut children = Vec::new();
    for side in [left, right] {
        match side {
            Expr::And(inner) => children.extend(inner),
            other => children.push(other),
        }
    }
    Expr::And(children)
}

fn flatten_or(left: Expr, right: Expr) -> Expr {
    let mut children = Vec::new();
    for side in [left, right] {
        match side {
            Expr::Or(inner) => children.extend(inner),
            other => children.push(other),
        }
    }
    Expr::Or(children)
}

fn compare_op(op: &BinaryOperator) -> Result<CompareOp> {
    match op {
        BinaryOperator::Eq => Ok(CompareOp::Eq),
        BinaryOperator::NotEq => Ok(CompareOp::NotEq),
        BinaryOperator::Lt => Ok(CompareOp::Lt),
        BinaryOperator::LtEq => Ok(CompareOp::LtEq),
        BinaryOperator::Gt => Ok(CompareOp::Gt),
        BinaryOperator::GtEq => Ok(CompareOp::GtEq),
        other => Err(Error::PredicateBuild(format!(
            "unsupported operator in value filter: {other}"
        ))),
    }
}

fn lower_comparison(left: &SqlExpr, op: CompareOp, right: &SqlExpr) -> Result<Expr> {
    if let Ok(column) = column_name(left) {
        return Ok(Expr::Pred(Filter::compare(column, op, literal(right)?)));
    }
    let column = column_name(right).map_err(|_| {
        Error::PredicateBuild(format!(
            "comparison needs a column on one side: {left} {} {right}",
            op.as_str()
        ))
    })?;
    Ok(Expr::Pred(Filter::compare(column, op.flipped(), literal(left)?)))
}

fn column_name(expr: &SqlExpr) -> Result<String> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(ident.value.clone()),
        SqlExpr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value.clone())
            .ok_or_else(|| Error::PredicateBuild("empty compound identifier".into())),
        SqlExpr::Nested(inner) => column_name(inner),
        other => Err(Error::PredicateBuild(format!("expected a column name, got {other}"))),
    }
}

fn literal(expr: &SqlExpr) -> Result<Literal> {
    match expr {
        SqlExpr::Value(value) => literal_from_value(value),
        SqlExpr::Nested(inner) => literal(inner),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Literal::Integer(v) => Ok(Literal::Integer(-v)),
            Literal::Float(v) => Ok(Literal::Float(-v)),
            other => Err(Error::PredicateBuild(format!(
                "cannot negate {} literal",
                other.kind()
            ))),
        },
        SqlExpr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        } => literal(expr),
        other => Err(Error::PredicateBuild(format!("expected a literal, got {other}"))),
    }
}

fn literal_from_value(value: &ValueWithSpan) -> Result<Literal> {
    match &value.value {
        Value::Null => Ok(Literal::Null),
        Value::Boolean(b) => Ok(Literal::Boolean(*b)),
        Value::Number(text, _) => parse_number_literal(text),
        other => other
            .clone()
            .into_string()
            .map(Literal::String)
            .ok_or_else(|| Error::PredicateBuild(format!("unsupported literal: {other}"))),
    }
}

fn parse_number_literal(text: &str) -> Result<Literal> {
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|err| Error::PredicateBuild(format!("invalid float literal: {err}")))
    } else {
        text.parse::<i64>()
            .map(Literal::Integer)
            .map_err(|err| Error::PredicateBuild(format!("invalid integer literal: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Expr {
        ValueFilter::parse(text).unwrap().expr().clone()
    }

    #[test]
    fn equality_and_conjunction() {
        let expr = parse("tissue = 'lung' AND n_genes > 500 AND is_primary = true");
        assert_eq!(
            expr,
            Expr::all_of(vec![
                Filter::equals("tissue", "lung"),
                Filter::compare("n_genes", CompareOp::Gt, 500),
                Filter::equals("is_primary", true),
            ])
        );
    }

    #[test]
    fn literal_on_left_flips_operator() {
        assert_eq!(
            parse("500 < n_genes"),
            Expr::Pred(Filter::compare("n_genes", CompareOp::Gt, 500))
        );
    }

    #[test]
    fn in_list_between_and_null_checks() {
        assert_eq!(
            parse("assay NOT IN ('10x', 'smart-seq')"),
            Expr::Pred(Filter {
                column: "assay".into(),
                op: Operator::In {
                    values: vec!["10x".into(), "smart-seq".into()],
                    negated: true,
                },
            })
        );
        assert_eq!(
            parse("score BETWEEN -1.5 AND 2"),
            Expr::all_of(vec![
                Filter::compare("score", CompareOp::GtEq, -1.5),
                Filter::compare("score", CompareOp::LtEq, 2),
            ])
        );
        assert_eq!(
            parse("donor IS NOT NULL"),
            Expr::Pred(Filter {
                column: "donor".into(),
                op: Operator::IsNull { negated: true },
            })
        );
    }

    #[test]
    fn nested_or_flattens() {
        match parse("(a = 1 OR b = 2) OR NOT c = 3") {
            Expr::Or(children) => {
                assert_eq!(children.len(), 3);
                assert!(matches!(children[2], Expr::Not(_)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn quoted_identifiers_keep_their_case() {
        assert_eq!(
            parse("\"Cell Type\" = 'T cell'"),
            Expr::Pred(Filter::equals("Cell Type", "T cell"))
        );
    }

    #[test]
    fn malformed_filters_are_predicate_errors() {
        for text in ["", "tissue =", "tissue = 'lung' extra", "a + 1", "1 = 2", "lower(a) = 'x'"] {
            let err = ValueFilter::parse(text).unwrap_err();
            assert!(
                matches!(err, Error::PredicateBuild(_)),
                "{text:?} should fail with PredicateBuild, got {err:?}"
            );
        }
    }

    #[test]
    fn source_text_is_preserved() {
        let filter = ValueFilter::parse("tissue = 'lung'").unwrap();
        assert_eq!(filter.to_string(), "tissue = 'lung'");
        assert_eq!(filter.source(), "tissue = 'lung'");
    }
}
