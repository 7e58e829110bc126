use anyhow::{bail, Result};
use std::cmp::Ordering;

use crate::errors::Error;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// The expression forms the operators evaluate: column references
/// (`tuple_idx` picks the join side), literals, comparisons, boolean
/// connectives, addition, and references into an aggregation's
/// `(group_bys, aggregates)` row.
#[derive(Debug, Clone)]
pub enum Expression {
    ColumnValue {
        tuple_idx: usize,
        col_idx: usize,
    },
    Literal(Value),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Add {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    GroupByRef(usize),
    AggregateRef(usize),
}

impl Expression {
    pub fn column(col_idx: usize) -> Self {
        Expression::ColumnValue {
            tuple_idx: 0,
            col_idx,
        }
    }

    pub fn join_column(tuple_idx: usize, col_idx: usize) -> Self {
        Expression::ColumnValue { tuple_idx, col_idx }
    }

    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logic(op: LogicOp, left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Result<Value> {
        self.evaluate_inner(&|tuple_idx, col_idx| {
            if tuple_idx != 0 {
                bail!(Error::Internal(
                    "join-side column outside a join".to_string()
                ));
            }
            debug_assert!(col_idx < schema.fields.len());
            Ok(tuple.value_at(col_idx)?.clone())
        })
    }

    pub fn evaluate_join(
        &self,
        left: &Tuple,
        _left_schema: &Schema,
        right: &Tuple,
        _right_schema: &Schema,
    ) -> Result<Value> {
        self.evaluate_inner(&|tuple_idx, col_idx| match tuple_idx {
            0 => Ok(left.value_at(col_idx)?.clone()),
            1 => Ok(right.value_at(col_idx)?.clone()),
            _ => bail!(Error::Internal(format!("bad join side {tuple_idx}"))),
        })
    }

    pub fn evaluate_aggregate(&self, group_bys: &[Value], aggregates: &[Value]) -> Result<Value> {
        match self {
            Expression::GroupByRef(idx) => Ok(group_bys[*idx].clone()),
            Expression::AggregateRef(idx) => Ok(aggregates[*idx].clone()),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Comparison { op, left, right } => Ok(compare(
                *op,
                &left.evaluate_aggregate(group_bys, aggregates)?,
                &right.evaluate_aggregate(group_bys, aggregates)?,
            )),
            Expression::Logic { op, left, right } => {
                let left = left.evaluate_aggregate(group_bys, aggregates)?.bool()?;
                let right = right.evaluate_aggregate(group_bys, aggregates)?.bool()?;
                Ok(Value::Bool(match op {
                    LogicOp::And => left && right,
                    LogicOp::Or => left || right,
                }))
            }
            Expression::Add { left, right } => left
                .evaluate_aggregate(group_bys, aggregates)?
                .add(&right.evaluate_aggregate(group_bys, aggregates)?),
            Expression::ColumnValue { .. } => bail!(Error::Internal(
                "column reference inside an aggregate expression".to_string()
            )),
        }
    }

    fn evaluate_inner(
        &self,
        column: &dyn Fn(usize, usize) -> Result<Value>,
    ) -> Result<Value> {
        match self {
            Expression::ColumnValue { tuple_idx, col_idx } => column(*tuple_idx, *col_idx),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Comparison { op, left, right } => Ok(compare(
                *op,
                &left.evaluate_inner(column)?,
                &right.evaluate_inner(column)?,
            )),
            Expression::Logic { op, left, right } => {
                let left = left.evaluate_inner(column)?.bool()?;
                let right = right.evaluate_inner(column)?.bool()?;
                Ok(Value::Bool(match op {
                    LogicOp::And => left && right,
                    LogicOp::Or => left || right,
                }))
            }
            Expression::Add { left, right } => left
                .evaluate_inner(column)?
                .add(&right.evaluate_inner(column)?),
            Expression::GroupByRef(_) | Expression::AggregateRef(_) => bail!(Error::Internal(
                "aggregate reference outside an aggregation".to_string()
            )),
        }
    }
}

/// Null operands and type mismatches compare as false, whatever the
/// operator.
fn compare(op: ComparisonOp, left: &Value, right: &Value) -> Value {
    let Some(ordering) = left.partial_cmp(right) else {
        return Value::Bool(false);
    };
    Value::Bool(match op {
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::NotEq => ordering != Ordering::Equal,
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::GtEq => ordering != Ordering::Less,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::LtEq => ordering != Ordering::Greater,
    })
}
