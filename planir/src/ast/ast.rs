// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression trees attached to plan nodes
//!
//! Expressions are produced by the query parser, which lives outside this
//! crate. Plan nodes only need to inspect them: which variables they read,
//! whether they are deterministic or constant, and which functions they call.

use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Value),
    Array(Vec<Expression>),
    Range(RangeExpression),
    Reference(VariableId),
    PropertyAccess(PropertyAccess),
    ArrayIndex(ArrayIndexExpression),
    Expansion(ExpansionExpression),
    Binary(BinaryExpression),
    QuantifiedComparison(QuantifiedComparisonExpression),
    Logical(LogicalExpression),
    Unary(UnaryExpression),
    FunctionCall(FunctionCall),
}

/// Integer range: low..high
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeExpression {
    pub low: Box<Expression>,
    pub high: Box<Expression>,
}

/// Attribute access: object.property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAccess {
    pub object: Box<Expression>,
    pub property: String,
}

/// Indexed access: array[index]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayIndexExpression {
    pub array: Box<Expression>,
    pub index: Box<Expression>,
}

/// Array expansion: source[*] with `projection` evaluated per element
/// while `iterator` is bound to that element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionExpression {
    pub iterator: VariableId,
    pub source: Box<Expression>,
    pub projection: Box<Expression>,
}

/// Comparison: left op right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub left: Box<Expression>,
    pub operator: Operator,
    pub right: Box<Expression>,
}

/// Array comparison: left ALL|ANY|NONE op right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedComparisonExpression {
    pub left: Box<Expression>,
    pub operator: Operator,
    pub quantifier: Quantifier,
    pub right: Box<Expression>,
}

/// N-ary AND / OR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    pub operator: Operator,
    pub operands: Vec<Expression>,
}

/// Unary NOT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    pub operator: Operator,
    pub expression: Box<Expression>,
}

/// Function call with the properties the planner cares about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Expression>,
    /// Same arguments always produce the same result
    pub deterministic: bool,
    /// May be evaluated on a remote server
    pub remote_safe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    In,
    NotIn,
    Like,
    Regex,

    // Logical
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantifier {
    All,
    Any,
    None,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        !matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    /// The operator that holds exactly when `self` does not
    pub fn negated(&self) -> Option<Operator> {
        match self {
            Operator::Equal => Some(Operator::NotEqual),
            Operator::NotEqual => Some(Operator::Equal),
            Operator::LessThan => Some(Operator::GreaterEqual),
            Operator::LessEqual => Some(Operator::GreaterThan),
            Operator::GreaterThan => Some(Operator::LessEqual),
            Operator::GreaterEqual => Some(Operator::LessThan),
            Operator::In => Some(Operator::NotIn),
            Operator::NotIn => Some(Operator::In),
            _ => None,
        }
    }
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn reference(variable: VariableId) -> Self {
        Expression::Reference(variable)
    }

    pub fn property(object: Expression, property: impl Into<String>) -> Self {
        Expression::PropertyAccess(PropertyAccess {
            object: Box::new(object),
            property: property.into(),
        })
    }

    pub fn index(array: Expression, index: Expression) -> Self {
        Expression::ArrayIndex(ArrayIndexExpression {
            array: Box::new(array),
            index: Box::new(index),
        })
    }

    pub fn range(low: Expression, high: Expression) -> Self {
        Expression::Range(RangeExpression {
            low: Box::new(low),
            high: Box::new(high),
        })
    }

    pub fn compare(left: Expression, operator: Operator, right: Expression) -> Self {
        Expression::Binary(BinaryExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn quantified(
        left: Expression,
        quantifier: Quantifier,
        operator: Operator,
        right: Expression,
    ) -> Self {
        Expression::QuantifiedComparison(QuantifiedComparisonExpression {
            left: Box::new(left),
            operator,
            quantifier,
            right: Box::new(right),
        })
    }

    pub fn expansion(iterator: VariableId, source: Expression, projection: Expression) -> Self {
        Expression::Expansion(ExpansionExpression {
            iterator,
            source: Box::new(source),
            projection: Box::new(projection),
        })
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::Logical(LogicalExpression {
            operator: Operator::And,
            operands,
        })
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Logical(LogicalExpression {
            operator: Operator::Or,
            operands,
        })
    }

    pub fn not(expression: Expression) -> Self {
        Expression::Unary(UnaryExpression {
            operator: Operator::Not,
            expression: Box::new(expression),
        })
    }

    pub fn function(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::FunctionCall(FunctionCall {
            name: name.into(),
            arguments,
            deterministic: true,
            remote_safe: true,
        })
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_) | Expression::Reference(_) => vec![],
            Expression::Array(members) => members.iter().collect(),
            Expression::Range(range) => vec![&range.low, &range.high],
            Expression::PropertyAccess(access) => vec![&access.object],
            Expression::ArrayIndex(access) => vec![&access.array, &access.index],
            Expression::Expansion(expansion) => vec![&expansion.source, &expansion.projection],
            Expression::Binary(binary) => vec![&binary.left, &binary.right],
            Expression::QuantifiedComparison(cmp) => vec![&cmp.left, &cmp.right],
            Expression::Logical(logical) => logical.operands.iter().collect(),
            Expression::Unary(unary) => vec![&unary.expression],
            Expression::FunctionCall(call) => call.arguments.iter().collect(),
        }
    }

    /// Collect variables read by this expression. Expansion iterators are
    /// bound inside the expression and are not reported.
    pub fn referenced_variables(&self, vars: &mut VarSet) {
        let mut bound = Vec::new();
        self.collect_references(vars, &mut bound);
    }

    fn collect_references(&self, vars: &mut VarSet, bound: &mut Vec<VariableId>) {
        match self {
            Expression::Reference(id) => {
                if !bound.contains(id) {
                    vars.insert(*id);
                }
            }
            Expression::Expansion(expansion) => {
                expansion.source.collect_references(vars, bound);
                bound.push(expansion.iterator);
                expansion.projection.collect_references(vars, bound);
                bound.pop();
            }
            _ => {
                for child in self.children() {
                    child.collect_references(vars, bound);
                }
            }
        }
    }

    pub fn references(&self, variable: VariableId) -> bool {
        let mut vars = VarSet::new();
        self.referenced_variables(&mut vars);
        vars.contains(&variable)
    }

    pub fn is_deterministic(&self) -> bool {
        if let Expression::FunctionCall(call) = self {
            if !call.deterministic {
                return false;
            }
        }
        self.children().iter().all(|c| c.is_deterministic())
    }

    /// True when the value is known at planning time
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Reference(_) | Expression::FunctionCall(_) => false,
            Expression::Expansion(_) => false,
            _ => self.children().iter().all(|c| c.is_constant()),
        }
    }

    /// True when every function call may run on a remote server
    pub fn can_run_remotely(&self) -> bool {
        if let Expression::FunctionCall(call) = self {
            if !call.remote_safe {
                return false;
            }
        }
        self.children().iter().all(|c| c.can_run_remotely())
    }

    pub fn function_names(&self, names: &mut BTreeSet<String>) {
        if let Expression::FunctionCall(call) = self {
            names.insert(call.name.clone());
        }
        for child in self.children() {
            child.function_names(names);
        }
    }

    /// Copy of this expression with every free reference to `variable`
    /// replaced by `replacement`
    pub fn replace_variable(&self, variable: VariableId, replacement: &Expression) -> Expression {
        self.transform(&mut |expr| match expr {
            Expression::Reference(id) if *id == variable => Some(replacement.clone()),
            _ => None,
        })
    }

    /// Bottom-up rewrite: `f` may return a replacement for any subtree; when it
    /// returns `None` the subtree is rebuilt from its transformed children.
    pub fn transform<F>(&self, f: &mut F) -> Expression
    where
        F: FnMut(&Expression) -> Option<Expression>,
    {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        match self {
            Expression::Literal(_) | Expression::Reference(_) => self.clone(),
            Expression::Array(members) => {
                Expression::Array(members.iter().map(|m| m.transform(f)).collect())
            }
            Expression::Range(range) => Expression::Range(RangeExpression {
                low: Box::new(range.low.transform(f)),
                high: Box::new(range.high.transform(f)),
            }),
            Expression::PropertyAccess(access) => Expression::PropertyAccess(PropertyAccess {
                object: Box::new(access.object.transform(f)),
                property: access.property.clone(),
            }),
            Expression::ArrayIndex(access) => Expression::ArrayIndex(ArrayIndexExpression {
                array: Box::new(access.array.transform(f)),
                index: Box::new(access.index.transform(f)),
            }),
            Expression::Expansion(expansion) => Expression::Expansion(ExpansionExpression {
                iterator: expansion.iterator,
                source: Box::new(expansion.source.transform(f)),
                projection: Box::new(expansion.projection.transform(f)),
            }),
            Expression::Binary(binary) => Expression::Binary(BinaryExpression {
                left: Box::new(binary.left.transform(f)),
                operator: binary.operator,
                right: Box::new(binary.right.transform(f)),
            }),
            Expression::QuantifiedComparison(cmp) => {
                Expression::QuantifiedComparison(QuantifiedComparisonExpression {
                    left: Box::new(cmp.left.transform(f)),
                    operator: cmp.operator,
                    quantifier: cmp.quantifier,
                    right: Box::new(cmp.right.transform(f)),
                })
            }
            Expression::Logical(logical) => Expression::Logical(LogicalExpression {
                operator: logical.operator,
                operands: logical.operands.iter().map(|o| o.transform(f)).collect(),
            }),
            Expression::Unary(unary) => Expression::Unary(UnaryExpression {
                operator: unary.operator,
                expression: Box::new(unary.expression.transform(f)),
            }),
            Expression::FunctionCall(call) => Expression::FunctionCall(FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.iter().map(|a| a.transform(f)).collect(),
                deterministic: call.deterministic,
                remote_safe: call.remote_safe,
            }),
        }
    }

    /// Number of elements when this is a constant array literal or range
    pub fn static_length(&self) -> Option<usize> {
        match self {
            Expression::Array(members) if self.is_constant() => Some(members.len()),
            Expression::Literal(Value::Array(items)) => Some(items.len()),
            Expression::Range(range) => {
                let low = range.low.as_integer()?;
                let high = range.high.as_integer()?;
                let span = (i128::from(high) - i128::from(low)).unsigned_abs() + 1;
                Some(usize::try_from(span).unwrap_or(usize::MAX))
            }
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Expression::Literal(value) => value.as_i64(),
            _ => None,
        }
    }
}
