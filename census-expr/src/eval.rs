//! Evaluation of [`Expr`] trees against Arrow record batches.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Datum, Scalar};
use arrow::compute::kernels::{boolean, cmp};
use arrow::compute::{CastOptions, cast, cast_with_options, filter_record_batch};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};

use crate::expr::{CompareOp, Expr, Filter, Operator};
use crate::literal::Literal;

/// Evaluate `expr` for every row of `batch`.
///
/// SQL three-valued logic applies: comparisons against null values produce
/// null, and [`filter_batch`] drops rows whose result is null.
pub fn evaluate(expr: &Expr, batch: &RecordBatch) -> Result<BooleanArray> {
    let rows = batch.num_rows();
    match expr {
        Expr::Literal(value) => Ok(BooleanArray::from(vec![*value; rows])),
        Expr::Pred(filter) => evaluate_filter(filter, batch),
        Expr::Not(inner) => Ok(boolean::not(&evaluate(inner, batch)?)?),
        Expr::And(children) => {
            let mut acc = BooleanArray::from(vec![true; rows]);
            for child in children {
                acc = boolean::and_kleene(&acc, &evaluate(child, batch)?)?;
            }
            Ok(acc)
        }
        Expr::Or(children) => {
            let mut acc = BooleanArray::from(vec![false; rows]);
            for child in children {
                acc = boolean::or_kleene(&acc, &evaluate(child, batch)?)?;
            }
            Ok(acc)
        }
    }
}

/// Keep only the rows of `batch` for which `expr` is true.
pub fn filter_batch(expr: &Expr, batch: &RecordBatch) -> Result<RecordBatch> {
    let mask = evaluate(expr, batch)?;
    Ok(filter_record_batch(batch, &mask)?)
}

fn evaluate_filter(filter: &Filter, batch: &RecordBatch) -> Result<BooleanArray> {
    let column = batch
        .column_by_name(&filter.column)
        .ok_or_else(|| Error::not_found(format!("value filter column '{}'", filter.column)))?;
    let column = unpack_dictionary(column)?;

    match &filter.op {
        Operator::Compare { op, value } => compare(&column, *op, value, &filter.column),
        Operator::In { values, negated } => {
            let mut acc = BooleanArray::from(vec![false; column.len()]);
            for value in values.iter().filter(|v| !v.is_null()) {
                let hit = compare(&column, CompareOp::Eq, value, &filter.column)?;
                acc = boolean::or_kleene(&acc, &hit)?;
            }
            // A null in the list makes every non-match unknown.
            if values.iter().any(Literal::is_null) {
                acc = boolean::or_kleene(&acc, &BooleanArray::new_null(column.len()))?;
            }
            if *negated {
                Ok(boolean::not(&acc)?)
            } else {
                Ok(acc)
            }
        }
        Operator::IsNull { negated } => {
            if *negated {
                Ok(boolean::is_not_null(column.as_ref())?)
            } else {
                Ok(boolean::is_null(column.as_ref())?)
            }
        }
    }
}

fn compare(column: &ArrayRef, op: CompareOp, value: &Literal, name: &str) -> Result<BooleanArray> {
    if value.is_null() {
        return Ok(BooleanArray::new_null(column.len()));
    }
    let (lhs, rhs) = coerce(column, value, name)?;
    let rhs = Scalar::new(rhs);
    let lhs: &dyn Datum = &lhs;
    let out = match op {
        CompareOp::Eq => cmp::eq(lhs, &rhs)?,
        CompareOp::NotEq => cmp::neq(lhs, &rhs)?,
        CompareOp::Lt => cmp::lt(lhs, &rhs)?,
        CompareOp::LtEq => cmp::lt_eq(lhs, &rhs)?,
        CompareOp::Gt => cmp::gt(lhs, &rhs)?,
        CompareOp::GtEq => cmp::gt_eq(lhs, &rhs)?,
    };
    Ok(out)
}

/// Bring the column and the literal to one comparable type. Integer columns
/// compared against fractional literals are widened to `Float64`; otherwise
/// the literal takes the column's type.
fn coerce(column: &ArrayRef, value: &Literal, name: &str) -> Result<(ArrayRef, ArrayRef)> {
    let literal = value.to_array();
    let column_type = column.data_type().clone();

    if column_type.is_integer() && matches!(value, Literal::Float(_)) {
        let widened = cast(column.as_ref(), &DataType::Float64)?;
        return Ok((widened, literal));
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let literal = cast_with_options(literal.as_ref(), &column_type, &options).map_err(|err| {
        Error::PredicateBuild(format!(
            "cannot compare column '{name}' of type {column_type} with {} literal: {err}",
            value.kind()
        ))
    })?;
    Ok((Arc::clone(column), literal))
}

fn unpack_dictionary(column: &ArrayRef) -> Result<ArrayRef> {
    match column.data_type() {
        DataType::Dictionary(_, value_type) => Ok(cast(column.as_ref(), value_type)?),
        _ => Ok(Arc::clone(column)),
    }
}
