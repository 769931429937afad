// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph node payloads: traversal, shortest path and k shortest paths
//!
//! A traversal carries the filter conditions an optimizer rule pushed into
//! it. Conditions registered per depth and all-depth conditions reference the
//! node's temporary variable in place of the path element they test.

use crate::ast::Expression;
use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Start or target of a graph operation: a variable or a constant vertex id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEndpoint {
    #[serde(default)]
    pub variable: Option<VariableId>,
    #[serde(default)]
    pub vertex_id: Option<String>,
}

impl PathEndpoint {
    pub fn variable(variable: VariableId) -> Self {
        Self {
            variable: Some(variable),
            vertex_id: None,
        }
    }

    pub fn constant(vertex_id: impl Into<String>) -> Self {
        Self {
            variable: None,
            vertex_id: Some(vertex_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalOptions {
    pub min_depth: u64,
    pub max_depth: u64,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            min_depth: 1,
            max_depth: 1,
        }
    }
}

/// FOR v, e, p IN min..max OUTBOUND start graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalNode {
    pub graph: String,
    pub start: PathEndpoint,
    #[serde(default)]
    pub vertex_out_variable: Option<VariableId>,
    #[serde(default)]
    pub edge_out_variable: Option<VariableId>,
    #[serde(default)]
    pub path_out_variable: Option<VariableId>,
    pub options: TraversalOptions,
    /// Stands in for the tested vertex or edge inside pushed-down conditions
    pub tmp_variable: VariableId,
    /// Filter conditions now covered by the traversal
    #[serde(default)]
    pub condition: Option<Expression>,
    #[serde(default)]
    pub edge_conditions: BTreeMap<u64, Vec<Expression>>,
    #[serde(default)]
    pub vertex_conditions: BTreeMap<u64, Vec<Expression>>,
    #[serde(default)]
    pub global_edge_conditions: Vec<Expression>,
    #[serde(default)]
    pub global_vertex_conditions: Vec<Expression>,
    #[serde(default)]
    pub post_filter_conditions: Vec<Expression>,
}

impl TraversalNode {
    pub fn new(
        graph: impl Into<String>,
        start: PathEndpoint,
        options: TraversalOptions,
        tmp_variable: VariableId,
    ) -> Self {
        Self {
            graph: graph.into(),
            start,
            vertex_out_variable: None,
            edge_out_variable: None,
            path_out_variable: None,
            options,
            tmp_variable,
            condition: None,
            edge_conditions: BTreeMap::new(),
            vertex_conditions: BTreeMap::new(),
            global_edge_conditions: Vec::new(),
            global_vertex_conditions: Vec::new(),
            post_filter_conditions: Vec::new(),
        }
    }

    pub fn with_outputs(
        mut self,
        vertex: Option<VariableId>,
        edge: Option<VariableId>,
        path: Option<VariableId>,
    ) -> Self {
        self.vertex_out_variable = vertex;
        self.edge_out_variable = edge;
        self.path_out_variable = path;
        self
    }

    /// Whether an element at `depth` can exist on any produced path.
    /// Edge arrays hold one element less than vertex arrays.
    pub fn is_in_range(&self, depth: u64, is_edge: bool) -> bool {
        if is_edge {
            depth < self.options.max_depth
        } else {
            depth <= self.options.max_depth
        }
    }

    /// Register a condition on the element at `depth`; false if already known
    pub fn register_condition(&mut self, is_edge: bool, depth: u64, condition: Expression) -> bool {
        let conditions = if is_edge {
            self.edge_conditions.entry(depth).or_default()
        } else {
            self.vertex_conditions.entry(depth).or_default()
        };
        push_unique(conditions, condition)
    }

    /// Register a condition every path element must satisfy
    pub fn register_global_condition(&mut self, is_edge: bool, condition: Expression) -> bool {
        if is_edge {
            push_unique(&mut self.global_edge_conditions, condition)
        } else {
            push_unique(&mut self.global_vertex_conditions, condition)
        }
    }

    pub fn register_post_filter(&mut self, condition: Expression) -> bool {
        push_unique(&mut self.post_filter_conditions, condition)
    }

    /// AND `covered` into the covered condition; false if already contained
    pub fn add_covered_condition(&mut self, covered: &Expression) -> bool {
        match &mut self.condition {
            None => {
                self.condition = Some(Expression::and(vec![covered.clone()]));
                true
            }
            Some(Expression::Logical(and)) if and.operator == crate::ast::Operator::And => {
                push_unique(&mut and.operands, covered.clone())
            }
            Some(existing) => {
                if existing == covered {
                    return false;
                }
                let previous = existing.clone();
                self.condition = Some(Expression::and(vec![previous, covered.clone()]));
                true
            }
        }
    }

    fn conditions(&self) -> impl Iterator<Item = &Expression> {
        self.edge_conditions
            .values()
            .chain(self.vertex_conditions.values())
            .flatten()
            .chain(self.global_edge_conditions.iter())
            .chain(self.global_vertex_conditions.iter())
            .chain(self.post_filter_conditions.iter())
    }

    pub(crate) fn used_variables(&self, vars: &mut VarSet) {
        vars.extend(self.start.variable);
        let mut inner = VarSet::new();
        for condition in self.conditions() {
            condition.referenced_variables(&mut inner);
        }
        inner.remove(&self.tmp_variable);
        for own in self.variables_set_here() {
            inner.remove(&own);
        }
        vars.extend(inner);
    }

    pub(crate) fn variables_set_here(&self) -> Vec<VariableId> {
        [
            self.vertex_out_variable,
            self.edge_out_variable,
            self.path_out_variable,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn push_unique(conditions: &mut Vec<Expression>, condition: Expression) -> bool {
    if conditions.contains(&condition) {
        false
    } else {
        conditions.push(condition);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortestPathNode {
    pub graph: String,
    pub start: PathEndpoint,
    pub target: PathEndpoint,
    #[serde(default)]
    pub vertex_out_variable: Option<VariableId>,
    #[serde(default)]
    pub edge_out_variable: Option<VariableId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KShortestPathsNode {
    pub graph: String,
    pub start: PathEndpoint,
    pub target: PathEndpoint,
    pub path_out_variable: VariableId,
}
