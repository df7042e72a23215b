// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use atomseq_units::{Nanos, ns};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;

/// Element type of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarDtype {
    Int,
    Float,
}

/// A declared variable: a name bound to a value only at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub dtype: VarDtype,
    pub size: usize,
}

impl Variable {
    pub fn expr(&self) -> Expr {
        Expr::Var(self.name.clone())
    }
}

/// A concrete value supplied for a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Value::Int(_) | Value::Float(_) => 1,
            Value::IntArray(values) => values.len(),
            Value::FloatArray(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> VarDtype {
        match self {
            Value::Int(_) | Value::IntArray(_) => VarDtype::Int,
            Value::Float(_) | Value::FloatArray(_) => VarDtype::Float,
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(value) => Ok(*value),
            Value::Float(value) if value.fract() == 0.0 => Ok(*value as i64),
            _ => Err(Error::Argument(format!(
                "Expected an integer scalar, got {self:?}."
            ))),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Int(value) => Ok(*value as f64),
            Value::Float(value) => Ok(*value),
            _ => Err(Error::Argument(format!(
                "Expected a scalar, got {self:?}."
            ))),
        }
    }

    pub fn as_nanos(&self) -> Result<Nanos> {
        Ok(ns(self.as_int()?))
    }

    fn elements(&self) -> Vec<f64> {
        match self {
            Value::Int(value) => vec![*value as f64],
            Value::Float(value) => vec![*value],
            Value::IntArray(values) => values.iter().map(|&v| v as f64).collect(),
            Value::FloatArray(values) => values.iter().copied().collect(),
        }
    }

    fn from_floats(values: Vec<f64>, int_result: bool, scalar: bool) -> Value {
        if int_result {
            let ints: Vec<i64> = values.iter().map(|&v| v as i64).collect();
            if scalar {
                Value::Int(ints[0])
            } else {
                Value::IntArray(ints)
            }
        } else if scalar {
            Value::Float(values[0])
        } else {
            Value::FloatArray(values)
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(values: Vec<i64>) -> Self {
        Value::IntArray(values)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::FloatArray(values)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Float(value)
    }
}

impl From<Nanos> for Expr {
    fn from(value: Nanos) -> Self {
        Expr::Int(value.value())
    }
}

impl From<&Variable> for Expr {
    fn from(variable: &Variable) -> Self {
        variable.expr()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A deferred arithmetic expression over variables and literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Var(String),
    /// Select elements of an array-valued expression.
    Index(Box<Expr>, Vec<usize>),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn index(self, indices: Vec<usize>) -> Expr {
        Expr::Index(Box::new(self), indices)
    }

    pub fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }

    pub fn add(self, rhs: Expr) -> Expr {
        Expr::Bin(BinOp::Add, Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        Expr::Bin(BinOp::Sub, Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Expr {
        Expr::Bin(BinOp::Mul, Box::new(self), Box::new(rhs))
    }

    pub fn div(self, rhs: Expr) -> Expr {
        Expr::Bin(BinOp::Div, Box::new(self), Box::new(rhs))
    }

    /// Collect the names of all variables this expression depends on.
    pub fn variables(&self, out: &mut IndexSet<String>) {
        match self {
            Expr::Int(_) | Expr::Float(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Index(base, _) | Expr::Neg(base) => base.variables(out),
            Expr::Bin(_, lhs, rhs) => {
                lhs.variables(out);
                rhs.variables(out);
            }
        }
    }

    pub fn evaluate(&self, store: &BindingStore) -> Result<Value> {
        match self {
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Float(value) => Ok(Value::Float(*value)),
            Expr::Var(name) => store.get(name),
            Expr::Index(base, indices) => {
                let value = base.evaluate(store)?;
                let elements = value.elements();
                let mut picked = Vec::with_capacity(indices.len());
                for &i in indices {
                    let Some(&element) = elements.get(i) else {
                        return Err(Error::Argument(format!(
                            "Index {i} is out of bounds for a value of size {}.",
                            elements.len()
                        )));
                    };
                    picked.push(element);
                }
                let int_result = value.dtype() == VarDtype::Int;
                Ok(Value::from_floats(picked, int_result, indices.len() == 1))
            }
            Expr::Neg(base) => {
                let value = base.evaluate(store)?;
                let negated = value.elements().into_iter().map(|v| -v).collect();
                Ok(Value::from_floats(
                    negated,
                    value.dtype() == VarDtype::Int,
                    value.len() == 1,
                ))
            }
            Expr::Bin(op, lhs, rhs) => {
                let lhs = lhs.evaluate(store)?;
                let rhs = rhs.evaluate(store)?;
                let left = lhs.elements();
                let right = rhs.elements();
                if left.len() != right.len() && left.len() != 1 && right.len() != 1 {
                    return Err(Error::Argument(format!(
                        "Cannot combine values of sizes {} and {}.",
                        left.len(),
                        right.len()
                    )));
                }
                let len = left.len().max(right.len());
                let pick = |values: &[f64], i: usize| {
                    if values.len() == 1 { values[0] } else { values[i] }
                };
                let combined: Vec<f64> = (0..len)
                    .map(|i| {
                        let (a, b) = (pick(&left, i), pick(&right, i));
                        match op {
                            BinOp::Add => a + b,
                            BinOp::Sub => a - b,
                            BinOp::Mul => a * b,
                            BinOp::Div => a / b,
                        }
                    })
                    .collect();
                // Division always yields floats; the other ops keep integers.
                let int_result = *op != BinOp::Div
                    && lhs.dtype() == VarDtype::Int
                    && rhs.dtype() == VarDtype::Int;
                let scalar = lhs.len() == 1 && rhs.len() == 1;
                Ok(Value::from_floats(combined, int_result, scalar))
            }
        }
    }
}

/// The values supplied to `build`, with tracking of which were consulted.
#[derive(Debug, Clone, Default)]
pub struct BindingStore {
    values: IndexMap<String, Value>,
    queried: RefCell<HashSet<String>>,
}

impl BindingStore {
    pub fn new() -> Self {
        BindingStore::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        match self.values.get(name) {
            Some(value) => {
                self.queried.borrow_mut().insert(name.to_string());
                Ok(value.clone())
            }
            None => Err(Error::Argument(format!(
                "Variable '{name}' was not given a value."
            ))),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of supplied bindings that were never consulted, in insertion
    /// order.
    pub fn unqueried(&self) -> Vec<String> {
        let queried = self.queried.borrow();
        self.values
            .keys()
            .filter(|name| !queried.contains(*name))
            .cloned()
            .collect()
    }
}
