// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Variable liveness
//!
//! For every reachable node the liveness pass records which variables are
//! still read downstream ("used later") and which are already defined
//! ("valid"). Both are stacks with one frame per enclosing spliced subquery.
//! Classic subqueries are analysed by a nested walk.

use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId, NodeType, VarUsage};
use crate::plan::nodes::NodeData;
use crate::plan::walker::{walk, VisitedSet, WalkerWorker};
use crate::variable::{VarSet, VarSetStack, VariableId};
use std::collections::HashMap;

/// Computes the liveness stacks of every node it visits
struct VarUsageFinder {
    visited: VisitedSet,
    used_later: VarSetStack,
    valid: VarSetStack,
    var_set_by: HashMap<VariableId, NodeId>,
    used_later_by_node: HashMap<NodeId, VarSetStack>,
    valid_by_node: HashMap<NodeId, VarSetStack>,
    error: Option<PlanError>,
}

impl VarUsageFinder {
    fn new() -> Self {
        Self::with_stacks(vec![VarSet::new()], vec![VarSet::new()])
    }

    fn with_stacks(used_later: VarSetStack, valid: VarSetStack) -> Self {
        Self {
            visited: VisitedSet::non_unique(),
            used_later,
            valid,
            var_set_by: HashMap::new(),
            used_later_by_node: HashMap::new(),
            valid_by_node: HashMap::new(),
            error: None,
        }
    }

    fn used_here(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> VarSet {
        match plan.variables_used_here(node.id()) {
            Ok(vars) => vars,
            Err(e) => {
                self.error.get_or_insert(e);
                VarSet::new()
            }
        }
    }

    fn merge(&mut self, other: VarUsageFinder) {
        self.var_set_by.extend(other.var_set_by);
        self.used_later_by_node.extend(other.used_later_by_node);
        self.valid_by_node.extend(other.valid_by_node);
        if let Some(e) = other.error {
            self.error.get_or_insert(e);
        }
    }
}

fn top(stack: &mut VarSetStack) -> &mut VarSet {
    if stack.is_empty() {
        stack.push(VarSet::new());
    }
    let last = stack.len() - 1;
    &mut stack[last]
}

impl WalkerWorker for VarUsageFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> bool {
        let used_here = self.used_here(plan, node);
        self.used_later_by_node
            .insert(node.id(), self.used_later.clone());

        if node.kind() == NodeType::SubqueryEnd {
            let outer = top(&mut self.used_later).clone();
            self.used_later.push(outer);
        }
        top(&mut self.used_later).extend(used_here);

        if node.kind() == NodeType::SubqueryStart && self.used_later.len() > 1 {
            if let Some(inner) = self.used_later.pop() {
                top(&mut self.used_later).extend(inner);
            }
        }
        false
    }

    fn after(&mut self, _plan: &ExecutionPlan, node: &ExecutionNode) {
        if node.kind() == NodeType::SubqueryEnd && self.valid.len() > 1 {
            self.valid.pop();
        }
        for var in node.variables_set_here() {
            top(&mut self.valid).insert(var);
            self.var_set_by.insert(var, node.id());
        }
        if node.kind() == NodeType::SubqueryStart {
            let outer = top(&mut self.valid).clone();
            self.valid.push(outer);
        }
        self.valid_by_node.insert(node.id(), self.valid.clone());
    }

    fn enter_subquery(&mut self, plan: &ExecutionPlan, _outer: &ExecutionNode, inner: &ExecutionNode) -> bool {
        let mut finder = VarUsageFinder::with_stacks(self.used_later.clone(), self.valid.clone());
        if let Err(e) = walk(plan, inner.id(), &mut finder) {
            self.error.get_or_insert(e);
        }
        self.merge(finder);
        false
    }
}

/// Variables a classic subquery reads from the enclosing plan
struct SubqueryVarUsageFinder {
    visited: VisitedSet,
    used_later: VarSet,
    valid: VarSet,
}

impl SubqueryVarUsageFinder {
    fn new() -> Self {
        Self {
            visited: VisitedSet::unique(),
            used_later: VarSet::new(),
            valid: VarSet::new(),
        }
    }

    fn outer_variables(self) -> VarSet {
        self.used_later.difference(&self.valid).copied().collect()
    }
}

impl WalkerWorker for SubqueryVarUsageFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> bool {
        // nested Subquery nodes report their own outer variables here
        if let Ok(vars) = plan.variables_used_here(node.id()) {
            self.used_later.extend(vars);
        }
        false
    }

    fn after(&mut self, _plan: &ExecutionPlan, node: &ExecutionNode) {
        self.valid.extend(node.variables_set_here());
    }
}

/// Collects user-defined variables set at or beyond a minimum loop depth
struct UserVarFinder {
    visited: VisitedSet,
    origin: NodeId,
    min_depth: i32,
    depth: i32,
    user_vars: VarSet,
}

impl UserVarFinder {
    fn new(origin: NodeId, min_depth: i32) -> Self {
        Self {
            visited: VisitedSet::non_unique(),
            origin,
            min_depth,
            depth: -1,
            user_vars: VarSet::new(),
        }
    }

    fn restart(&mut self, min_depth: i32) {
        self.reset();
        self.min_depth = min_depth;
        self.depth = -1;
        self.user_vars.clear();
    }
}

impl WalkerWorker for UserVarFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn after(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) {
        match node.kind() {
            NodeType::Singleton => self.depth = 0,
            NodeType::EnumerateCollection
            | NodeType::Index
            | NodeType::EnumerateList
            | NodeType::Traversal
            | NodeType::ShortestPath
            | NodeType::KShortestPaths
            | NodeType::Collect => self.depth += 1,
            _ => {}
        }
        if self.depth >= self.min_depth && node.id() != self.origin {
            for var in node.variables_set_here() {
                if plan
                    .variables()
                    .get(var)
                    .map(|v| v.is_user_defined())
                    .unwrap_or(false)
                {
                    self.user_vars.insert(var);
                }
            }
        }
    }
}

impl ExecutionPlan {
    /// Variables read by node `id`. Classic subqueries report the outer
    /// variables their nested plan reads; a retain-all COLLECT reports every
    /// user variable in scope. Never overlaps the variables set by the node.
    pub fn variables_used_here(&self, id: NodeId) -> PlanResult<VarSet> {
        let node = self.node(id)?;
        let mut vars = VarSet::new();
        node.data().direct_used_variables(&mut vars);
        match node.data() {
            NodeData::Subquery(sq) => {
                let mut finder = SubqueryVarUsageFinder::new();
                walk(self, sq.subquery, &mut finder)?;
                vars.extend(finder.outer_variables());
            }
            NodeData::Collect(collect) if collect.retains_all_variables() => {
                vars.extend(self.collect_scope_variables(id)?);
            }
            _ => {}
        }
        for var in node.variables_set_here() {
            vars.remove(&var);
        }
        Ok(vars)
    }

    /// User variables visible to a COLLECT ... INTO without KEEP
    fn collect_scope_variables(&self, id: NodeId) -> PlanResult<VarSet> {
        let mut finder = UserVarFinder::new(id, 1);
        walk(self, id, &mut finder)?;
        if finder.depth == 1 {
            // outermost loop level
            finder.restart(0);
            walk(self, id, &mut finder)?;
        }
        Ok(finder.user_vars)
    }

    /// Compute liveness stacks for all nodes reachable from the root
    pub fn find_var_usage(&mut self) -> PlanResult<()> {
        let root = self.root()?;
        let mut finder = VarUsageFinder::new();
        walk(self, root, &mut finder)?;
        if let Some(e) = finder.error {
            return Err(e);
        }

        for node in self.nodes.values_mut() {
            node.var_usage = None;
            node.in_spliced_subquery = false;
        }
        for (id, used_later) in finder.used_later_by_node {
            let valid = finder.valid_by_node.remove(&id).unwrap_or_default();
            let node = self.node_mut(id)?;
            node.in_spliced_subquery = used_later.len() > 1;
            node.var_usage = Some(VarUsage { used_later, valid });
        }
        self.var_set_by = finder.var_set_by;
        self.var_usage_computed = true;
        log::debug!("computed variable usage for {} nodes", self.var_set_by.len());
        Ok(())
    }

    pub fn is_var_usage_computed(&self) -> bool {
        self.var_usage_computed
    }

    /// Discard liveness and the register plans derived from it
    pub fn invalidate_var_usage(&mut self) {
        for node in self.nodes.values_mut() {
            node.var_usage = None;
            node.registers = None;
        }
        self.var_set_by.clear();
        self.var_usage_computed = false;
        self.register_plan = None;
        self.subquery_register_plans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::plan::nodes::{CalculationNode, CollectNode, EnumerateCollectionNode, ReturnNode};

    #[test]
    fn test_retain_all_collect_at_top_level() {
        let mut plan = ExecutionPlan::default();
        let a = plan.variables_mut().create_variable("a");
        let tmp = plan.variables_mut().create_temporary_variable();
        let g = plan.variables_mut().create_variable("g");
        let singleton = plan.create_node(NodeData::Singleton);
        let calc_a = plan.create_node(NodeData::Calculation(CalculationNode {
            out_variable: a,
            expression: Expression::literal(1),
        }));
        let calc_tmp = plan.create_node(NodeData::Calculation(CalculationNode {
            out_variable: tmp,
            expression: Expression::literal(2),
        }));
        let collect = plan.create_node(NodeData::Collect(CollectNode::grouping(Vec::new(), Some(g))));
        plan.add_dependency(calc_a, singleton).unwrap();
        plan.add_dependency(calc_tmp, calc_a).unwrap();
        plan.add_dependency(collect, calc_tmp).unwrap();

        let used = plan.variables_used_here(collect).unwrap();
        assert!(used.contains(&a));
        assert!(!used.contains(&tmp));
        assert!(!used.contains(&g));
    }

    #[test]
    fn test_retain_all_collect_inside_loop() {
        let mut plan = ExecutionPlan::default();
        let before_loop = plan.variables_mut().create_variable("outer");
        let doc = plan.variables_mut().create_variable("doc");
        let g = plan.variables_mut().create_variable("g");
        let singleton = plan.create_node(NodeData::Singleton);
        let calc = plan.create_node(NodeData::Calculation(CalculationNode {
            out_variable: before_loop,
            expression: Expression::literal(1),
        }));
        let scan = plan.create_node(NodeData::EnumerateCollection(EnumerateCollectionNode {
            collection: "users".to_string(),
            out_variable: doc,
            random: false,
            count_only: false,
        }));
        let collect = plan.create_node(NodeData::Collect(CollectNode::grouping(Vec::new(), Some(g))));
        plan.add_dependency(calc, singleton).unwrap();
        plan.add_dependency(scan, calc).unwrap();
        plan.add_dependency(collect, scan).unwrap();

        let used = plan.variables_used_here(collect).unwrap();
        assert!(used.contains(&doc));
        assert!(!used.contains(&before_loop));
    }

    #[test]
    fn test_var_usage_requires_root() {
        let mut plan = ExecutionPlan::default();
        assert_eq!(plan.find_var_usage().unwrap_err(), PlanError::NoRoot);
    }

    #[test]
    fn test_invalidate_clears_stacks() {
        let mut plan = ExecutionPlan::default();
        let x = plan.variables_mut().create_variable("x");
        let singleton = plan.create_node(NodeData::Singleton);
        let calc = plan.create_node(NodeData::Calculation(CalculationNode {
            out_variable: x,
            expression: Expression::literal(1),
        }));
        let ret = plan.create_node(NodeData::Return(ReturnNode {
            in_variable: x,
            count: false,
        }));
        plan.add_dependency(calc, singleton).unwrap();
        plan.add_dependency(ret, calc).unwrap();
        plan.set_root(ret).unwrap();
        plan.find_var_usage().unwrap();
        assert!(plan.node(calc).unwrap().vars_used_later().unwrap()[0].contains(&x));
        assert_eq!(plan.get_var_set_by(x), Some(calc));

        plan.invalidate_var_usage();
        assert!(!plan.is_var_usage_computed());
        assert_eq!(
            plan.node(calc).unwrap().vars_used_later().unwrap_err(),
            PlanError::VarUsageNotComputed(calc)
        );
    }
}
