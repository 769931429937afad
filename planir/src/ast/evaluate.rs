// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning-time constant folding
//!
//! Only what the optimizer needs: evaluating an expression once some of its
//! variables are bound to known values. Anything that cannot be decided at
//! planning time (unbound references, function calls, pattern operators)
//! yields `None`.

use super::ast::{Expression, Operator, Quantifier, RangeExpression};
use crate::variable::VariableId;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Variable values available while folding
pub type Bindings = HashMap<VariableId, Value>;

/// Largest range that is expanded into an array while folding
pub const MAX_RANGE_ELEMENTS: u64 = 1_000;

pub fn evaluate(expression: &Expression, bindings: &Bindings) -> Option<Value> {
    match expression {
        Expression::Literal(value) => Some(value.clone()),
        Expression::Reference(id) => bindings.get(id).cloned(),
        Expression::Array(members) => members
            .iter()
            .map(|m| evaluate(m, bindings))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expression::Range(range) => {
            let (low, high) = range_bounds(range, bindings)?;
            if (i128::from(high) - i128::from(low)).unsigned_abs() >= u128::from(MAX_RANGE_ELEMENTS) {
                log::trace!("range {}..{} too large to fold", low, high);
                return None;
            }
            let items: Vec<Value> = if low <= high {
                (low..=high).map(Value::from).collect()
            } else {
                (high..=low).rev().map(Value::from).collect()
            };
            Some(Value::Array(items))
        }
        Expression::PropertyAccess(access) => {
            let object = evaluate(&access.object, bindings)?;
            Some(match object {
                Value::Object(map) => map.get(&access.property).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        Expression::ArrayIndex(access) => {
            let array = evaluate(&access.array, bindings)?;
            let index = evaluate(&access.index, bindings)?;
            Some(index_value(&array, &index))
        }
        Expression::Expansion(expansion) => {
            let source = evaluate(&expansion.source, bindings)?;
            let Value::Array(items) = source else {
                return Some(Value::Array(vec![]));
            };
            let mut scoped = bindings.clone();
            let mut result = Vec::with_capacity(items.len());
            for item in items {
                scoped.insert(expansion.iterator, item);
                result.push(evaluate(&expansion.projection, &scoped)?);
            }
            Some(Value::Array(result))
        }
        Expression::Binary(binary) => {
            if let (Operator::In | Operator::NotIn, Expression::Range(range)) =
                (binary.operator, binary.right.as_ref())
            {
                let left = evaluate(&binary.left, bindings)?;
                let contained = range_contains(range_bounds(range, bindings)?, &left);
                return Some(Value::Bool(contained == (binary.operator == Operator::In)));
            }
            let left = evaluate(&binary.left, bindings)?;
            let right = evaluate(&binary.right, bindings)?;
            compare(&left, binary.operator, &right).map(Value::Bool)
        }
        Expression::QuantifiedComparison(cmp) => {
            let left = evaluate(&cmp.left, bindings)?;
            let right = evaluate(&cmp.right, bindings)?;
            let items = match left {
                Value::Array(items) => items,
                _ => vec![],
            };
            let mut hits = 0usize;
            for item in &items {
                if compare(item, cmp.operator, &right)? {
                    hits += 1;
                }
            }
            Some(Value::Bool(match cmp.quantifier {
                Quantifier::All => hits == items.len(),
                Quantifier::Any => hits > 0,
                Quantifier::None => hits == 0,
            }))
        }
        Expression::Logical(logical) => {
            let is_and = logical.operator == Operator::And;
            for operand in &logical.operands {
                let truthy = is_truthy(&evaluate(operand, bindings)?);
                if truthy != is_and {
                    return Some(Value::Bool(!is_and));
                }
            }
            Some(Value::Bool(is_and))
        }
        Expression::Unary(unary) => {
            let value = evaluate(&unary.expression, bindings)?;
            Some(Value::Bool(!is_truthy(&value)))
        }
        Expression::FunctionCall(_) => None,
    }
}

fn range_bounds(range: &RangeExpression, bindings: &Bindings) -> Option<(i64, i64)> {
    let low = evaluate(&range.low, bindings)?.as_i64()?;
    let high = evaluate(&range.high, bindings)?.as_i64()?;
    Some((low, high))
}

/// Membership in an integer range without expanding it
fn range_contains((low, high): (i64, i64), value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    let (min, max) = if low <= high { (low, high) } else { (high, low) };
    if let Some(i) = n.as_i64() {
        return min <= i && i <= max;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => min as f64 <= f && f <= max as f64,
        _ => false,
    }
}

/// Boolean interpretation of a value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Total order across value types: null < bool < number < string < array < object
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    let rank = |v: &Value| match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    };
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut left_keys: Vec<_> = a.keys().collect();
            let mut right_keys: Vec<_> = b.keys().collect();
            left_keys.sort();
            right_keys.sort();
            match left_keys.cmp(&right_keys) {
                Ordering::Equal => {}
                ord => return ord,
            }
            for key in left_keys {
                let ord = compare_values(&a[key], &b[key]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

fn compare(left: &Value, operator: Operator, right: &Value) -> Option<bool> {
    let ord = compare_values(left, right);
    match operator {
        Operator::Equal => Some(ord == Ordering::Equal),
        Operator::NotEqual => Some(ord != Ordering::Equal),
        Operator::LessThan => Some(ord == Ordering::Less),
        Operator::LessEqual => Some(ord != Ordering::Greater),
        Operator::GreaterThan => Some(ord == Ordering::Greater),
        Operator::GreaterEqual => Some(ord != Ordering::Less),
        Operator::In | Operator::NotIn => {
            let contained = match right {
                Value::Array(items) => items
                    .iter()
                    .any(|item| compare_values(left, item) == Ordering::Equal),
                _ => false,
            };
            Some(contained == (operator == Operator::In))
        }
        _ => None,
    }
}

fn index_value(array: &Value, index: &Value) -> Value {
    match (array, index) {
        (Value::Array(items), Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return Value::Null;
            };
            let len = items.len() as i64;
            let position = if i < 0 { len + i } else { i };
            if position < 0 || position >= len {
                Value::Null
            } else {
                items[position as usize].clone()
            }
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
