// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter conditions accumulated by optimizer rules

use super::ast::{BinaryExpression, Expression, Operator, QuantifiedComparisonExpression, Quantifier};

/// A conjunction of filter expressions that can be normalized into
/// disjunctive normal form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    root: Option<Expression>,
    normalized: bool,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&Expression> {
        self.root.as_ref()
    }

    /// AND `expression` into the condition
    pub fn and_combine(&mut self, expression: &Expression) {
        self.normalized = false;
        self.root = Some(match self.root.take() {
            None => expression.clone(),
            Some(Expression::Logical(mut logical)) if logical.operator == Operator::And => {
                logical.operands.push(expression.clone());
                Expression::Logical(logical)
            }
            Some(existing) => Expression::and(vec![existing, expression.clone()]),
        });
    }

    /// Rewrite the root into OR(AND(...), AND(...), ...)
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        if let Some(root) = self.root.take() {
            let branches = to_dnf(&push_negations(&root, false));
            self.root = Some(Expression::or(
                branches.into_iter().map(Expression::and).collect(),
            ));
        }
        self.normalized = true;
    }

    /// Conjunctions of the normalized condition; empty when nothing was
    /// accumulated. Call [`Condition::normalize`] first.
    pub fn disjuncts(&self) -> Vec<Vec<Expression>> {
        match &self.root {
            Some(Expression::Logical(or)) if self.normalized && or.operator == Operator::Or => or
                .operands
                .iter()
                .map(|branch| match branch {
                    Expression::Logical(and) if and.operator == Operator::And => {
                        and.operands.clone()
                    }
                    other => vec![other.clone()],
                })
                .collect(),
            Some(other) => vec![vec![other.clone()]],
            None => vec![],
        }
    }
}

/// Move NOT inward; comparisons absorb it by flipping their operator
fn push_negations(expression: &Expression, negate: bool) -> Expression {
    match expression {
        Expression::Unary(unary) if unary.operator == Operator::Not => {
            push_negations(&unary.expression, !negate)
        }
        Expression::Logical(logical) => {
            let operator = match (logical.operator, negate) {
                (Operator::And, true) => Operator::Or,
                (Operator::Or, true) => Operator::And,
                (op, _) => op,
            };
            let operands = logical
                .operands
                .iter()
                .map(|o| push_negations(o, negate))
                .collect();
            Expression::Logical(super::ast::LogicalExpression { operator, operands })
        }
        Expression::Binary(binary) if negate => match binary.operator.negated() {
            Some(operator) => Expression::Binary(BinaryExpression {
                left: binary.left.clone(),
                operator,
                right: binary.right.clone(),
            }),
            None => Expression::not(expression.clone()),
        },
        Expression::QuantifiedComparison(cmp) if negate => {
            // NOT (x ALL op y) == x ANY !op y, NOT (x NONE op y) == x ANY op y
            match (cmp.quantifier, cmp.operator.negated()) {
                (Quantifier::All, Some(op)) => quantified(cmp, Quantifier::Any, op),
                (Quantifier::Any, _) => quantified(cmp, Quantifier::None, cmp.operator),
                (Quantifier::None, _) => quantified(cmp, Quantifier::Any, cmp.operator),
                _ => Expression::not(expression.clone()),
            }
        }
        other if negate => Expression::not(other.clone()),
        other => other.clone(),
    }
}

fn quantified(
    cmp: &QuantifiedComparisonExpression,
    quantifier: Quantifier,
    operator: Operator,
) -> Expression {
    Expression::QuantifiedComparison(QuantifiedComparisonExpression {
        left: cmp.left.clone(),
        operator,
        quantifier,
        right: cmp.right.clone(),
    })
}

/// Distribute AND over OR. Input must be negation-normalized.
fn to_dnf(expression: &Expression) -> Vec<Vec<Expression>> {
    match expression {
        Expression::Logical(logical) if logical.operator == Operator::Or => logical
            .operands
            .iter()
            .flat_map(to_dnf)
            .collect(),
        Expression::Logical(logical) if logical.operator == Operator::And => {
            let mut product: Vec<Vec<Expression>> = vec![vec![]];
            for operand in &logical.operands {
                let branches = to_dnf(operand);
                let mut next = Vec::with_capacity(product.len() * branches.len());
                for prefix in &product {
                    for branch in &branches {
                        let mut combined = prefix.clone();
                        combined.extend(branch.iter().cloned());
                        next.push(combined);
                    }
                }
                product = next;
            }
            product
        }
        atom => vec![vec![atom.clone()]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableId;

    fn cmp(var: u32, op: Operator, value: i64) -> Expression {
        Expression::compare(
            Expression::reference(VariableId(var)),
            op,
            Expression::literal(value),
        )
    }

    #[test]
    fn test_and_combine_flattens() {
        let mut condition = Condition::new();
        assert!(condition.is_empty());
        condition.and_combine(&cmp(1, Operator::Equal, 1));
        condition.and_combine(&cmp(2, Operator::Equal, 2));
        condition.and_combine(&cmp(3, Operator::Equal, 3));
        condition.normalize();
        let disjuncts = condition.disjuncts();
        assert_eq!(disjuncts.len(), 1);
        assert_eq!(disjuncts[0].len(), 3);
    }

    #[test]
    fn test_normalize_distributes_or() {
        let mut condition = Condition::new();
        condition.and_combine(&Expression::or(vec![
            cmp(1, Operator::Equal, 1),
            cmp(1, Operator::Equal, 2),
        ]));
        condition.and_combine(&cmp(2, Operator::GreaterThan, 0));
        condition.normalize();
        let disjuncts = condition.disjuncts();
        assert_eq!(disjuncts.len(), 2);
        assert!(disjuncts.iter().all(|d| d.len() == 2));
    }

    #[test]
    fn test_negation_is_pushed_into_comparisons() {
        let mut condition = Condition::new();
        condition.and_combine(&Expression::not(Expression::or(vec![
            cmp(1, Operator::LessThan, 3),
            cmp(2, Operator::Equal, 4),
        ])));
        condition.normalize();
        let disjuncts = condition.disjuncts();
        assert_eq!(
            disjuncts,
            vec![vec![
                cmp(1, Operator::GreaterEqual, 3),
                cmp(2, Operator::NotEqual, 4)
            ]]
        );
    }
}
