// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Move FILTER conditions into graph traversals
//!
//! Walking from the root toward the singleton, the rule accumulates the
//! expressions of calculations feeding pending filters. When it reaches a
//! traversal it splits the accumulated condition into conjuncts and hands
//! every conjunct it understands to the traversal:
//!
//! - conditions on the vertex or edge output become post filters,
//! - `p.edges[n]` / `p.vertices[n]` comparisons become per-depth conditions,
//! - `p.edges[*].x ALL == y` style comparisons become all-depth conditions.
//!
//! A per-depth condition on a depth the traversal can never reach makes the
//! traversal produce nothing, so a NoResults node is put above it.

use crate::ast::evaluate::{evaluate, is_truthy, Bindings};
use crate::ast::{
    BinaryExpression, Condition, Expression, Operator, QuantifiedComparisonExpression, Quantifier,
};
use crate::config::PlannerConfig;
use crate::error::PlanResult;
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId, NodeType};
use crate::plan::nodes::graph::TraversalNode;
use crate::plan::nodes::NodeData;
use crate::plan::walker::{walk, VisitedSet, WalkerWorker};
use crate::variable::{VarSet, VariableId};
use serde_json::Value;
use std::collections::HashSet;

pub const RULE_NAME: &str = "optimize-traversals";

/// Kinds the accumulated condition passes through unchanged
const IGNORED_KINDS: &[NodeType] = &[
    NodeType::EnumerateList,
    NodeType::Collect,
    NodeType::Scatter,
    NodeType::Distribute,
    NodeType::Gather,
    NodeType::Remote,
    NodeType::Subquery,
    NodeType::Index,
    NodeType::Return,
    NodeType::Sort,
    NodeType::EnumerateCollection,
    NodeType::Limit,
    NodeType::ShortestPath,
    NodeType::KShortestPaths,
    NodeType::EnumerateView,
    NodeType::Window,
];

/// Which traversal output a conjunct exclusively refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Vertex,
    Edge,
    Path,
}

/// Something to register on a traversal once the walk is over
#[derive(Debug, Clone, PartialEq)]
enum Pushdown {
    PostFilter(Expression),
    Depth {
        is_edge: bool,
        depth: u64,
        condition: Expression,
    },
    Global {
        is_edge: bool,
        condition: Expression,
    },
}

/// Everything the finder decided for one traversal
#[derive(Debug, Default)]
struct TraversalChange {
    node: Option<NodeId>,
    pushdowns: Vec<Pushdown>,
    covered: Vec<Expression>,
    min_depth: Option<u64>,
    impossible: bool,
}

/// A comparison on one statically indexed path element
struct PointAccess {
    is_edge: bool,
    depth: u64,
    condition: Expression,
}

struct TraversalConditionFinder {
    visited: VisitedSet,
    condition: Condition,
    filter_variables: VarSet,
    changes: Vec<TraversalChange>,
}

impl TraversalConditionFinder {
    fn new() -> Self {
        Self {
            visited: VisitedSet::non_unique(),
            condition: Condition::new(),
            filter_variables: VarSet::new(),
            changes: Vec::new(),
        }
    }

    fn reset_condition(&mut self) {
        self.condition = Condition::new();
        self.filter_variables.clear();
    }

    /// Returns whether a change was recorded for `node`
    fn handle_traversal(&mut self, node: &ExecutionNode, traversal: &TraversalNode) -> bool {
        self.condition.normalize();
        let disjuncts = self.condition.disjuncts();
        if disjuncts.len() != 1 {
            log::debug!(
                "condition above traversal {} has {} alternatives, leaving it alone",
                node.id(),
                disjuncts.len()
            );
            return false;
        }

        let valid = node
            .vars_valid()
            .ok()
            .and_then(|stack| stack.last().cloned())
            .unwrap_or_default();

        let mut change = TraversalChange {
            node: Some(node.id()),
            ..TraversalChange::default()
        };
        let mut min_depth = traversal.options.min_depth;

        for conjunct in disjuncts.into_iter().flatten() {
            let Some(scope) = classify(&conjunct, traversal, &valid) else {
                log::debug!(
                    "conjunct above traversal {} cannot be moved into it",
                    node.id()
                );
                continue;
            };
            if !conjunct.is_deterministic() || !conjunct.can_run_remotely() {
                continue;
            }
            match scope {
                Scope::Vertex | Scope::Edge => {
                    let output = if scope == Scope::Vertex {
                        traversal.vertex_out_variable
                    } else {
                        traversal.edge_out_variable
                    };
                    let Some(output) = output else { continue };
                    let rewritten = conjunct
                        .replace_variable(output, &Expression::reference(traversal.tmp_variable));
                    change.pushdowns.push(Pushdown::PostFilter(rewritten));
                    change.covered.push(conjunct);
                }
                Scope::Path => {
                    let Some(path) = traversal.path_out_variable else { continue };
                    if let Some(point) = point_access(&conjunct, path, traversal.tmp_variable) {
                        if !traversal.is_in_range(point.depth, point.is_edge) {
                            log::debug!(
                                "traversal {} can never reach depth {}",
                                node.id(),
                                point.depth
                            );
                            change.pushdowns.clear();
                            change.covered.clear();
                            change.min_depth = None;
                            change.impossible = true;
                            break;
                        }
                        if min_depth < point.depth && !is_true_on_null_path(&conjunct, path) {
                            min_depth = point.depth;
                            change.min_depth = Some(point.depth);
                        }
                        change.pushdowns.push(Pushdown::Depth {
                            is_edge: point.is_edge,
                            depth: point.depth,
                            condition: point.condition,
                        });
                        change.covered.push(conjunct);
                    } else if let Some((is_edge, condition)) =
                        global_access(&conjunct, path, traversal.tmp_variable)
                    {
                        change
                            .pushdowns
                            .push(Pushdown::Global { is_edge, condition });
                        change.covered.push(conjunct);
                    }
                }
            }
        }

        if change.impossible || !change.pushdowns.is_empty() {
            self.changes.push(change);
            return true;
        }
        false
    }
}

impl WalkerWorker for TraversalConditionFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> bool {
        if !self.condition.is_empty() && !plan.is_deterministic(node.id()).unwrap_or(false) {
            return true;
        }

        let kind = node.kind();
        if IGNORED_KINDS.contains(&kind) {
            return false;
        }
        if kind.is_modification() {
            self.reset_condition();
            return false;
        }

        match node.data() {
            NodeData::Singleton | NodeData::NoResults => return true,
            NodeData::Filter(filter) => {
                self.filter_variables.insert(filter.in_variable);
            }
            NodeData::Calculation(calculation) => {
                if self.filter_variables.contains(&calculation.out_variable) {
                    self.condition.and_combine(&calculation.expression);
                }
            }
            NodeData::Traversal(traversal) => {
                if !self.condition.is_empty() && self.handle_traversal(node, traversal) {
                    self.reset_condition();
                }
            }
            _ => {}
        }
        false
    }
}

/// Scope of a conjunct, or None if it cannot be evaluated inside the
/// traversal
fn classify(conjunct: &Expression, traversal: &TraversalNode, valid: &VarSet) -> Option<Scope> {
    let mut vars = VarSet::new();
    conjunct.referenced_variables(&mut vars);

    let mut scope = None;
    for var in &vars {
        if !valid.contains(var) {
            return None;
        }
        let this = if Some(*var) == traversal.vertex_out_variable {
            Scope::Vertex
        } else if Some(*var) == traversal.edge_out_variable {
            Scope::Edge
        } else if Some(*var) == traversal.path_out_variable {
            Scope::Path
        } else {
            continue;
        };
        match scope {
            None => scope = Some(this),
            Some(existing) if existing != this => return None,
            Some(_) => {}
        }
    }
    scope
}

/// `path.edges` or `path.vertices`; returns whether it is the edge array
fn path_array(expression: &Expression, path: VariableId) -> Option<bool> {
    let Expression::PropertyAccess(access) = expression else {
        return None;
    };
    if *access.object != Expression::Reference(path) {
        return None;
    }
    match access.property.as_str() {
        "edges" => Some(true),
        "vertices" => Some(false),
        _ => None,
    }
}

/// Walk down attribute accesses to `path.edges[n]` / `path.vertices[n]`.
/// On success returns the array kind, the index and the side rewritten to
/// reference `tmp` in place of the element.
fn indexed_element(
    expression: &Expression,
    path: VariableId,
    tmp: VariableId,
) -> Option<(bool, u64, Expression)> {
    match expression {
        Expression::ArrayIndex(access) => {
            let is_edge = path_array(&access.array, path)?;
            let index = u64::try_from(access.index.as_integer()?).ok()?;
            Some((is_edge, index, Expression::reference(tmp)))
        }
        Expression::PropertyAccess(access) => {
            let (is_edge, index, object) = indexed_element(&access.object, path, tmp)?;
            Some((is_edge, index, Expression::property(object, access.property.clone())))
        }
        _ => None,
    }
}

fn point_access(conjunct: &Expression, path: VariableId, tmp: VariableId) -> Option<PointAccess> {
    let Expression::Binary(binary) = conjunct else {
        return None;
    };
    if !binary.operator.is_comparison() || matches!(binary.operator, Operator::Like | Operator::Regex) {
        return None;
    }

    let (element, other, element_on_left) = if let Some(found) =
        indexed_element(&binary.left, path, tmp)
    {
        (found, &binary.right, true)
    } else {
        (indexed_element(&binary.right, path, tmp)?, &binary.left, false)
    };
    if other.references(path) {
        return None;
    }

    let (is_edge, depth, rewritten) = element;
    let (left, right) = if element_on_left {
        (rewritten, (**other).clone())
    } else {
        ((**other).clone(), rewritten)
    };
    Some(PointAccess {
        is_edge,
        depth,
        condition: Expression::Binary(BinaryExpression {
            left: Box::new(left),
            operator: binary.operator,
            right: Box::new(right),
        }),
    })
}

/// `path.edges[*].x ALL op y` and `NONE` become a comparison on a single
/// element; `ANY` cannot be checked element by element
fn global_access(conjunct: &Expression, path: VariableId, tmp: VariableId) -> Option<(bool, Expression)> {
    let Expression::QuantifiedComparison(QuantifiedComparisonExpression {
        left,
        operator,
        quantifier,
        right,
    }) = conjunct
    else {
        return None;
    };
    let operator = match quantifier {
        Quantifier::All => *operator,
        Quantifier::None => operator.negated()?,
        Quantifier::Any => return None,
    };
    let Expression::Expansion(expansion) = &**left else {
        return None;
    };
    let is_edge = path_array(&expansion.source, path)?;
    if right.references(path) || expansion.projection.references(path) {
        return None;
    }
    let element = expansion
        .projection
        .replace_variable(expansion.iterator, &Expression::reference(tmp));
    Some((
        is_edge,
        Expression::Binary(BinaryExpression {
            left: Box::new(element),
            operator,
            right: right.clone(),
        }),
    ))
}

/// Whether `conjunct` holds for a path that does not exist. Undecidable
/// conjuncts count as true.
fn is_true_on_null_path(conjunct: &Expression, path: VariableId) -> bool {
    let mut bindings = Bindings::new();
    bindings.insert(path, Value::Null);
    evaluate(conjunct, &bindings)
        .map(|value| is_truthy(&value))
        .unwrap_or(true)
}

fn apply(plan: &mut ExecutionPlan, change: TraversalChange) -> PlanResult<bool> {
    let Some(id) = change.node else {
        return Ok(false);
    };

    if change.impossible {
        let parents = plan.node(id)?.parents().to_vec();
        for parent in parents {
            let no_results = plan.create_node(NodeData::NoResults);
            plan.replace_dependency(parent, id, no_results)?;
            plan.add_dependency(no_results, id)?;
        }
        return Ok(true);
    }

    let node = plan.node_mut(id)?;
    let traversal = node.as_traversal_mut()?;
    let mut altered = false;
    for pushdown in change.pushdowns {
        altered |= match pushdown {
            Pushdown::PostFilter(condition) => traversal.register_post_filter(condition),
            Pushdown::Depth {
                is_edge,
                depth,
                condition,
            } => traversal.register_condition(is_edge, depth, condition),
            Pushdown::Global { is_edge, condition } => {
                traversal.register_global_condition(is_edge, condition)
            }
        };
    }
    for covered in &change.covered {
        altered |= traversal.add_covered_condition(covered);
    }
    if let Some(min_depth) = change.min_depth {
        if traversal.options.min_depth < min_depth {
            traversal.options.min_depth = min_depth;
            altered = true;
        }
    }
    Ok(altered)
}

/// Push filter conditions into traversals; returns whether the plan changed
pub fn optimize_traversal_conditions(plan: &mut ExecutionPlan, _config: &PlannerConfig) -> PlanResult<bool> {
    plan.find_var_usage()?;
    let root = plan.root()?;

    let mut finder = TraversalConditionFinder::new();
    walk(plan, root, &mut finder)?;

    let mut altered = false;
    let mut seen = HashSet::new();
    for change in finder.changes {
        // a traversal behind a fan-in is reached once per path
        if change.node.is_some_and(|id| !seen.insert(id)) {
            continue;
        }
        altered |= apply(plan, change)?;
    }

    if altered {
        log::debug!("moved filter conditions into traversals");
        plan.invalidate_cost(root)?;
        plan.invalidate_var_usage();
    }
    Ok(altered)
}
