// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Structural plan checks

use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{NodeId, NodeType};
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use std::collections::HashSet;

impl ExecutionPlan {
    /// Check that edges are symmetric, the graph is acyclic and that the
    /// plan and each classic subquery end in exactly one Singleton
    pub fn verify(&self) -> PlanResult<()> {
        let root = self.root()?;
        self.check_symmetry()?;

        let mut dependencies = DiGraphMap::<NodeId, ()>::new();
        let mut all_edges = DiGraphMap::<NodeId, ()>::new();
        let mut starts = vec![root];
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.node(id)?;
            dependencies.add_node(id);
            all_edges.add_node(id);
            for dep in node.dependencies() {
                dependencies.add_edge(id, *dep, ());
                all_edges.add_edge(id, *dep, ());
                stack.push(*dep);
            }
            if let Some(sub) = node.data().subquery_root() {
                self.node(sub).map_err(|_| PlanError::MissingChild {
                    node: id,
                    child: "subquery",
                })?;
                all_edges.add_edge(id, sub, ());
                starts.push(sub);
                stack.push(sub);
            }
        }

        if is_cyclic_directed(&all_edges) {
            return Err(PlanError::InvalidStructure("plan contains a cycle".to_string()));
        }

        for start in starts {
            let mut leaves = Vec::new();
            let mut dfs = Dfs::new(&dependencies, start);
            while let Some(id) = dfs.next(&dependencies) {
                if dependencies.neighbors(id).next().is_none() {
                    leaves.push(id);
                }
            }
            match leaves.as_slice() {
                [leaf] if self.node(*leaf)?.kind() == NodeType::Singleton => {}
                [leaf] => {
                    return Err(PlanError::InvalidStructure(format!(
                        "plan starting at {} ends in {} {} instead of a singleton",
                        start,
                        self.node(*leaf)?.kind(),
                        leaf
                    )))
                }
                _ => {
                    return Err(PlanError::InvalidStructure(format!(
                        "plan starting at {} has {} leaves",
                        start,
                        leaves.len()
                    )))
                }
            }
        }
        Ok(())
    }

    fn check_symmetry(&self) -> PlanResult<()> {
        for node in self.nodes() {
            for dep in node.dependencies() {
                let dep_node = self.node(*dep)?;
                let back = dep_node.parents().iter().filter(|p| **p == node.id()).count();
                let forward = node.dependencies().iter().filter(|d| *d == dep).count();
                if back != forward {
                    return Err(PlanError::InvalidStructure(format!(
                        "{} depends on {} but is not listed as its parent",
                        node.id(),
                        dep
                    )));
                }
            }
            for parent in node.parents() {
                if !self.node(*parent)?.dependencies().contains(&node.id()) {
                    return Err(PlanError::InvalidStructure(format!(
                        "{} lists {} as parent without being its dependency",
                        node.id(),
                        parent
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::nodes::NodeData;

    #[test]
    fn test_single_chain_verifies() {
        let mut plan = ExecutionPlan::default();
        let singleton = plan.create_node(NodeData::Singleton);
        let nores = plan.create_node(NodeData::NoResults);
        plan.add_dependency(nores, singleton).unwrap();
        plan.set_root(nores).unwrap();
        plan.verify().unwrap();
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut plan = ExecutionPlan::default();
        let a = plan.create_node(NodeData::NoResults);
        let b = plan.create_node(NodeData::NoResults);
        plan.add_dependency(a, b).unwrap();
        plan.add_dependency(b, a).unwrap();
        plan.set_root(a).unwrap();
        assert!(matches!(plan.verify(), Err(PlanError::InvalidStructure(_))));
    }

    #[test]
    fn test_missing_singleton_is_rejected() {
        let mut plan = ExecutionPlan::default();
        let nores = plan.create_node(NodeData::NoResults);
        plan.set_root(nores).unwrap();
        assert!(matches!(plan.verify(), Err(PlanError::InvalidStructure(_))));
    }

    #[test]
    fn test_asymmetric_edge_is_rejected() {
        let mut plan = ExecutionPlan::default();
        let singleton = plan.create_node(NodeData::Singleton);
        let nores = plan.create_node(NodeData::NoResults);
        plan.add_dependency(nores, singleton).unwrap();
        plan.set_root(nores).unwrap();
        plan.node_mut(singleton).unwrap().parents.clear();
        assert!(matches!(plan.verify(), Err(PlanError::InvalidStructure(_))));
    }
}
