use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Types {
    Bool,
    Int,
    Str,
}

/// A runtime value flowing through the operators. Tuples are vectors of
/// these, serialized with bincode when they hit a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => bail!(Error::Internal(format!("expected a boolean, got {other}"))),
        }
    }

    pub fn int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => bail!(Error::Internal(format!("expected an integer, got {other}"))),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_add(*r))),
            (l, r) => bail!(Error::Internal(format!("cannot add {l} and {r}"))),
        }
    }

    /// Ordering between two values of the same type. `None` when either
    /// side is null or the types disagree.
    pub fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
            (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}
