// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hand-off to an execution engine
//!
//! The planner does not execute anything. An engine implements
//! [`ExecutorFactory`] and gets asked for one execution block per plan node,
//! dependencies before dependents.

use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId};
use crate::plan::walker::{walk, VisitedSet, WalkerWorker};

/// Builds execution blocks for plan nodes
pub trait ExecutorFactory {
    /// Block type produced by this engine
    type Block;

    /// Create the block for `node`. All dependencies and the classic
    /// subquery of `node` were handed out before.
    fn create_block(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> PlanResult<Self::Block>;
}

struct Instantiator<'a, F: ExecutorFactory> {
    visited: VisitedSet,
    factory: &'a mut F,
    blocks: Vec<(NodeId, F::Block)>,
    error: Option<PlanError>,
}

impl<F: ExecutorFactory> WalkerWorker for Instantiator<'_, F> {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn before(&mut self, _plan: &ExecutionPlan, _node: &ExecutionNode) -> bool {
        self.error.is_some()
    }

    fn after(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) {
        if self.error.is_some() {
            return;
        }
        let block = node
            .registers()
            .and_then(|_| self.factory.create_block(plan, node));
        match block {
            Ok(block) => self.blocks.push((node.id(), block)),
            Err(e) => self.error = Some(e),
        }
    }

    fn enter_subquery(&mut self, _plan: &ExecutionPlan, _outer: &ExecutionNode, _inner: &ExecutionNode) -> bool {
        true
    }
}

impl ExecutionPlan {
    /// Ask `factory` for a block per reachable node, in dependency order
    pub fn instantiate<F: ExecutorFactory>(&self, factory: &mut F) -> PlanResult<Vec<(NodeId, F::Block)>> {
        let root = self.root()?;
        if self.register_plan().is_none() {
            return Err(PlanError::RegistersNotPlanned(root));
        }

        let mut instantiator = Instantiator {
            visited: VisitedSet::unique(),
            factory,
            blocks: Vec::new(),
            error: None,
        };
        walk(self, root, &mut instantiator)?;
        if let Some(e) = instantiator.error {
            return Err(e);
        }
        log::debug!("instantiated {} execution blocks", instantiator.blocks.len());
        Ok(instantiator.blocks)
    }
}
