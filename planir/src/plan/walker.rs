// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan walking framework
//!
//! A walk starts at a node and descends into its dependencies, calling the
//! worker's `before` hook pre-order and `after` post-order. Classic
//! subqueries are only entered when the worker asks for it. Workers get
//! shared access to the plan; passes that rewrite the plan record their
//! changes and apply them once the walk has finished.

use crate::error::PlanResult;
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId, NodeType};
use std::collections::HashSet;

/// Whether a walk may visit a node more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerUniqueness {
    /// Every node is visited at most once per walk
    Unique,
    /// Nodes reachable over several paths are visited once per path
    NonUnique,
}

/// Visited bookkeeping of a walker
#[derive(Debug, Clone)]
pub struct VisitedSet {
    uniqueness: WalkerUniqueness,
    seen: HashSet<NodeId>,
    /// Kinds visited at most once even in non-unique mode
    once_kinds: Vec<NodeType>,
}

impl VisitedSet {
    pub fn new(uniqueness: WalkerUniqueness) -> Self {
        Self {
            uniqueness,
            seen: HashSet::new(),
            once_kinds: Vec::new(),
        }
    }

    pub fn unique() -> Self {
        Self::new(WalkerUniqueness::Unique)
    }

    pub fn non_unique() -> Self {
        Self::new(WalkerUniqueness::NonUnique)
    }

    pub fn with_once_kinds(mut self, kinds: &[NodeType]) -> Self {
        self.once_kinds = kinds.to_vec();
        self
    }

    pub fn uniqueness(&self) -> WalkerUniqueness {
        self.uniqueness
    }

    /// True if `node` was seen before and must be skipped; marks it as seen
    pub fn check_and_mark(&mut self, node: &ExecutionNode) -> bool {
        let tracked = self.uniqueness == WalkerUniqueness::Unique
            || self.once_kinds.contains(&node.kind());
        tracked && !self.seen.insert(node.id())
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Hooks of a plan walk
pub trait WalkerWorker {
    fn visited(&mut self) -> &mut VisitedSet;

    /// Pre-order hook; returning true aborts the whole walk
    fn before(&mut self, _plan: &ExecutionPlan, _node: &ExecutionNode) -> bool {
        false
    }

    /// Post-order hook
    fn after(&mut self, _plan: &ExecutionPlan, _node: &ExecutionNode) {}

    /// Whether to walk the classic subquery `inner` of `outer`
    fn enter_subquery(&mut self, _plan: &ExecutionPlan, _outer: &ExecutionNode, _inner: &ExecutionNode) -> bool {
        false
    }

    fn leave_subquery(&mut self, _plan: &ExecutionPlan, _outer: &ExecutionNode, _inner: &ExecutionNode) {}

    /// Skip `node` if it was already visited
    fn done(&mut self, node: &ExecutionNode) -> bool {
        self.visited().check_and_mark(node)
    }

    /// Forget visited nodes so the worker can walk again
    fn reset(&mut self) {
        self.visited().clear();
    }
}

/// Walk from `start`: dependencies first, then the classic subquery, then
/// the `after` hook. Returns true if the walk was aborted.
pub fn walk<W: WalkerWorker + ?Sized>(plan: &ExecutionPlan, start: NodeId, worker: &mut W) -> PlanResult<bool> {
    let node = plan.node(start)?;
    if worker.done(node) {
        return Ok(false);
    }
    if worker.before(plan, node) {
        return Ok(true);
    }
    for dep in node.dependencies() {
        if walk(plan, *dep, worker)? {
            return Ok(true);
        }
    }
    if walk_subquery(plan, node, worker, walk)? {
        return Ok(true);
    }
    worker.after(plan, node);
    Ok(false)
}

/// Like [`walk`], but enters a classic subquery before the dependencies
pub fn walk_subqueries_first<W: WalkerWorker + ?Sized>(
    plan: &ExecutionPlan,
    start: NodeId,
    worker: &mut W,
) -> PlanResult<bool> {
    let node = plan.node(start)?;
    if worker.done(node) {
        return Ok(false);
    }
    if worker.before(plan, node) {
        return Ok(true);
    }
    if walk_subquery(plan, node, worker, walk_subqueries_first)? {
        return Ok(true);
    }
    for dep in node.dependencies() {
        if walk_subqueries_first(plan, *dep, worker)? {
            return Ok(true);
        }
    }
    worker.after(plan, node);
    Ok(false)
}

fn walk_subquery<W: WalkerWorker + ?Sized>(
    plan: &ExecutionPlan,
    node: &ExecutionNode,
    worker: &mut W,
    descend: fn(&ExecutionPlan, NodeId, &mut W) -> PlanResult<bool>,
) -> PlanResult<bool> {
    let Some(sub) = node.data().subquery_root() else {
        return Ok(false);
    };
    let inner = plan.node(sub)?;
    if !worker.enter_subquery(plan, node, inner) {
        return Ok(false);
    }
    let aborted = descend(plan, sub, worker)?;
    worker.leave_subquery(plan, node, inner);
    Ok(aborted)
}

/// Collects the ids of nodes of given kinds
pub struct NodeFinder {
    visited: VisitedSet,
    kinds: Vec<NodeType>,
    enter_subqueries: bool,
    found: Vec<NodeId>,
}

impl NodeFinder {
    pub fn new(kinds: &[NodeType], enter_subqueries: bool) -> Self {
        Self {
            visited: VisitedSet::unique(),
            kinds: kinds.to_vec(),
            enter_subqueries,
            found: Vec::new(),
        }
    }

    pub fn into_found(self) -> Vec<NodeId> {
        self.found
    }
}

impl WalkerWorker for NodeFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, _plan: &ExecutionPlan, node: &ExecutionNode) -> bool {
        if self.kinds.contains(&node.kind()) {
            self.found.push(node.id());
        }
        false
    }

    fn enter_subquery(&mut self, _plan: &ExecutionPlan, _outer: &ExecutionNode, _inner: &ExecutionNode) -> bool {
        self.enter_subqueries
    }
}

/// Stops at the first node that is not deterministic
pub struct DeterministicFinder {
    visited: VisitedSet,
    deterministic: bool,
}

impl DeterministicFinder {
    pub fn new() -> Self {
        Self {
            visited: VisitedSet::unique(),
            deterministic: true,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }
}

impl Default for DeterministicFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkerWorker for DeterministicFinder {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> bool {
        if !plan.is_deterministic(node.id()).unwrap_or(false) {
            self.deterministic = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::nodes::NodeData;

    #[test]
    fn test_visited_set_modes() {
        let node = ExecutionNode::new(NodeId(4), NodeData::Singleton);
        let mut unique = VisitedSet::unique();
        assert!(!unique.check_and_mark(&node));
        assert!(unique.check_and_mark(&node));
        unique.clear();
        assert!(!unique.check_and_mark(&node));

        let mut non_unique = VisitedSet::non_unique();
        assert!(!non_unique.check_and_mark(&node));
        assert!(!non_unique.check_and_mark(&node));

        let mut once = VisitedSet::non_unique().with_once_kinds(&[NodeType::Singleton]);
        assert!(!once.check_and_mark(&node));
        assert!(once.check_and_mark(&node));
    }

    struct Recorder {
        visited: VisitedSet,
        order: Vec<NodeId>,
    }

    impl WalkerWorker for Recorder {
        fn visited(&mut self) -> &mut VisitedSet {
            &mut self.visited
        }

        fn after(&mut self, _plan: &ExecutionPlan, node: &ExecutionNode) {
            self.order.push(node.id());
        }
    }

    #[test]
    fn test_walk_is_post_order_toward_start() {
        let mut plan = ExecutionPlan::default();
        let singleton = plan.create_node(NodeData::Singleton);
        let nores = plan.create_node(NodeData::NoResults);
        plan.add_dependency(nores, singleton).unwrap();
        let mut recorder = Recorder {
            visited: VisitedSet::unique(),
            order: Vec::new(),
        };
        assert!(!walk(&plan, nores, &mut recorder).unwrap());
        assert_eq!(recorder.order, vec![singleton, nores]);
    }
}
