// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution nodes
//!
//! An [`ExecutionNode`] is one operator of a plan. Nodes are owned by their
//! [`crate::plan::ExecutionPlan`] and refer to each other by [`NodeId`]; the
//! plan keeps dependency and parent lists symmetric.

use crate::error::{PlanError, PlanResult};
use crate::plan::nodes::*;
use crate::plan::register_plan::{RegIdSet, RegIdSetStack};
use crate::variable::{VarSetStack, VariableId};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a node inside its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node kinds with their persisted type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Singleton = 1,
    EnumerateCollection = 2,
    EnumerateList = 4,
    Filter = 5,
    Limit = 6,
    Calculation = 7,
    Subquery = 8,
    Sort = 9,
    Collect = 10,
    Scatter = 11,
    Gather = 12,
    Remote = 13,
    Insert = 14,
    Remove = 15,
    Replace = 16,
    Update = 17,
    Return = 18,
    NoResults = 19,
    Distribute = 20,
    Upsert = 21,
    Traversal = 22,
    Index = 23,
    ShortestPath = 24,
    KShortestPaths = 25,
    SingleRemoteOperation = 26,
    EnumerateView = 27,
    DistributeConsumer = 28,
    SubqueryStart = 29,
    SubqueryEnd = 30,
    Materialize = 31,
    Async = 32,
    Mutex = 33,
    Window = 34,
    Join = 35,
}

const ALL_NODE_TYPES: [NodeType; 34] = [
    NodeType::Singleton,
    NodeType::EnumerateCollection,
    NodeType::EnumerateList,
    NodeType::Filter,
    NodeType::Limit,
    NodeType::Calculation,
    NodeType::Subquery,
    NodeType::Sort,
    NodeType::Collect,
    NodeType::Scatter,
    NodeType::Gather,
    NodeType::Remote,
    NodeType::Insert,
    NodeType::Remove,
    NodeType::Replace,
    NodeType::Update,
    NodeType::Return,
    NodeType::NoResults,
    NodeType::Distribute,
    NodeType::Upsert,
    NodeType::Traversal,
    NodeType::Index,
    NodeType::ShortestPath,
    NodeType::KShortestPaths,
    NodeType::SingleRemoteOperation,
    NodeType::EnumerateView,
    NodeType::DistributeConsumer,
    NodeType::SubqueryStart,
    NodeType::SubqueryEnd,
    NodeType::Materialize,
    NodeType::Async,
    NodeType::Mutex,
    NodeType::Window,
    NodeType::Join,
];

static TYPES_BY_ID: Lazy<HashMap<u64, NodeType>> =
    Lazy::new(|| ALL_NODE_TYPES.iter().map(|t| (t.type_id(), *t)).collect());

static TYPES_BY_NAME: Lazy<HashMap<&'static str, NodeType>> =
    Lazy::new(|| ALL_NODE_TYPES.iter().map(|t| (t.name(), *t)).collect());

impl NodeType {
    pub fn all() -> &'static [NodeType] {
        &ALL_NODE_TYPES
    }

    pub fn type_id(&self) -> u64 {
        *self as u64
    }

    pub fn from_type_id(id: u64) -> Option<NodeType> {
        TYPES_BY_ID.get(&id).copied()
    }

    pub fn from_name(name: &str) -> Option<NodeType> {
        TYPES_BY_NAME.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Singleton => "SingletonNode",
            NodeType::EnumerateCollection => "EnumerateCollectionNode",
            NodeType::EnumerateList => "EnumerateListNode",
            NodeType::Filter => "FilterNode",
            NodeType::Limit => "LimitNode",
            NodeType::Calculation => "CalculationNode",
            NodeType::Subquery => "SubqueryNode",
            NodeType::Sort => "SortNode",
            NodeType::Collect => "CollectNode",
            NodeType::Scatter => "ScatterNode",
            NodeType::Gather => "GatherNode",
            NodeType::Remote => "RemoteNode",
            NodeType::Insert => "InsertNode",
            NodeType::Remove => "RemoveNode",
            NodeType::Replace => "ReplaceNode",
            NodeType::Update => "UpdateNode",
            NodeType::Return => "ReturnNode",
            NodeType::NoResults => "NoResultsNode",
            NodeType::Distribute => "DistributeNode",
            NodeType::Upsert => "UpsertNode",
            NodeType::Traversal => "TraversalNode",
            NodeType::Index => "IndexNode",
            NodeType::ShortestPath => "ShortestPathNode",
            NodeType::KShortestPaths => "KShortestPathsNode",
            NodeType::SingleRemoteOperation => "SingleRemoteOperationNode",
            NodeType::EnumerateView => "EnumerateViewNode",
            NodeType::DistributeConsumer => "DistributeConsumer",
            NodeType::SubqueryStart => "SubqueryStartNode",
            NodeType::SubqueryEnd => "SubqueryEndNode",
            NodeType::Materialize => "MaterializeNode",
            NodeType::Async => "AsyncNode",
            NodeType::Mutex => "MutexNode",
            NodeType::Window => "WindowNode",
            NodeType::Join => "JoinNode",
        }
    }

    /// Kinds that iterate, i.e. open a new loop scope
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            NodeType::EnumerateCollection
                | NodeType::Index
                | NodeType::EnumerateList
                | NodeType::Traversal
                | NodeType::ShortestPath
                | NodeType::KShortestPaths
                | NodeType::EnumerateView
                | NodeType::Join
        )
    }

    /// Kinds after which rows have a different shape, so register planning
    /// opens a new depth
    pub fn increases_depth(&self) -> bool {
        matches!(
            self,
            NodeType::EnumerateCollection
                | NodeType::Index
                | NodeType::EnumerateList
                | NodeType::Collect
                | NodeType::Traversal
                | NodeType::ShortestPath
                | NodeType::KShortestPaths
                | NodeType::SingleRemoteOperation
                | NodeType::EnumerateView
                | NodeType::Materialize
                | NodeType::SubqueryStart
                | NodeType::SubqueryEnd
                | NodeType::Join
        )
    }

    /// False for kinds that pass their input rows through in place
    pub fn always_copies_rows(&self) -> bool {
        !matches!(
            self,
            NodeType::Calculation
                | NodeType::Subquery
                | NodeType::Singleton
                | NodeType::Limit
                | NodeType::Window
                | NodeType::Remote
                | NodeType::Scatter
                | NodeType::Gather
                | NodeType::Async
                | NodeType::Mutex
        )
    }

    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            NodeType::Insert
                | NodeType::Remove
                | NodeType::Replace
                | NodeType::Update
                | NodeType::Upsert
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Liveness computed for one node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VarUsage {
    /// Variables read somewhere between this node and the root
    pub used_later: VarSetStack,
    /// Variables defined by this node or upstream of it
    pub valid: VarSetStack,
}

/// Register assignment computed for one node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeRegisters {
    pub depth: usize,
    pub regs_to_clear: RegIdSet,
    pub regs_to_keep: RegIdSetStack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionNode {
    pub(crate) id: NodeId,
    pub(crate) dependencies: Vec<NodeId>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) data: NodeData,
    pub(crate) var_usage: Option<VarUsage>,
    pub(crate) registers: Option<NodeRegisters>,
    pub(crate) in_spliced_subquery: bool,
}

macro_rules! downcast {
    ($as_ref:ident, $as_mut:ident, $variant:ident, $payload:ty) => {
        pub fn $as_ref(&self) -> PlanResult<&$payload> {
            match &self.data {
                NodeData::$variant(inner) => Ok(inner),
                _ => Err(self.wrong_type(NodeType::$variant)),
            }
        }

        pub fn $as_mut(&mut self) -> PlanResult<&mut $payload> {
            let err = self.wrong_type(NodeType::$variant);
            match &mut self.data {
                NodeData::$variant(inner) => Ok(inner),
                _ => Err(err),
            }
        }
    };
}

impl ExecutionNode {
    pub fn new(id: NodeId, data: NodeData) -> Self {
        Self {
            id,
            dependencies: Vec::new(),
            parents: Vec::new(),
            data,
            var_usage: None,
            registers: None,
            in_spliced_subquery: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeType {
        self.data.kind()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut NodeData {
        &mut self.data
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn first_dependency(&self) -> Option<NodeId> {
        self.dependencies.first().copied()
    }

    pub fn first_parent(&self) -> Option<NodeId> {
        self.parents.first().copied()
    }

    pub fn has_dependency(&self) -> bool {
        !self.dependencies.is_empty()
    }

    pub fn has_parent(&self) -> bool {
        !self.parents.is_empty()
    }

    pub fn variables_set_here(&self) -> Vec<VariableId> {
        self.data.variables_set_here()
    }

    pub fn is_modification_node(&self) -> bool {
        self.kind().is_modification()
    }

    pub fn is_in_spliced_subquery(&self) -> bool {
        self.in_spliced_subquery
    }

    pub fn is_var_usage_valid(&self) -> bool {
        self.var_usage.is_some()
    }

    pub fn var_usage(&self) -> PlanResult<&VarUsage> {
        self.var_usage
            .as_ref()
            .ok_or(PlanError::VarUsageNotComputed(self.id))
    }

    pub fn vars_used_later(&self) -> PlanResult<&VarSetStack> {
        Ok(&self.var_usage()?.used_later)
    }

    pub fn vars_valid(&self) -> PlanResult<&VarSetStack> {
        Ok(&self.var_usage()?.valid)
    }

    pub fn registers(&self) -> PlanResult<&NodeRegisters> {
        self.registers
            .as_ref()
            .ok_or(PlanError::RegistersNotPlanned(self.id))
    }

    pub fn depth(&self) -> PlanResult<usize> {
        Ok(self.registers()?.depth)
    }

    pub fn regs_to_clear(&self) -> PlanResult<&RegIdSet> {
        Ok(&self.registers()?.regs_to_clear)
    }

    pub fn regs_to_keep(&self) -> PlanResult<&RegIdSetStack> {
        Ok(&self.registers()?.regs_to_keep)
    }

    fn wrong_type(&self, expected: NodeType) -> PlanError {
        PlanError::WrongNodeType {
            id: self.id,
            expected,
            actual: self.kind(),
        }
    }

    downcast!(as_enumerate_collection, as_enumerate_collection_mut, EnumerateCollection, EnumerateCollectionNode);
    downcast!(as_enumerate_list, as_enumerate_list_mut, EnumerateList, EnumerateListNode);
    downcast!(as_filter, as_filter_mut, Filter, FilterNode);
    downcast!(as_limit, as_limit_mut, Limit, LimitNode);
    downcast!(as_calculation, as_calculation_mut, Calculation, CalculationNode);
    downcast!(as_subquery, as_subquery_mut, Subquery, SubqueryNode);
    downcast!(as_sort, as_sort_mut, Sort, SortNode);
    downcast!(as_collect, as_collect_mut, Collect, CollectNode);
    downcast!(as_return, as_return_mut, Return, ReturnNode);
    downcast!(as_traversal, as_traversal_mut, Traversal, TraversalNode);
    downcast!(as_index, as_index_mut, Index, IndexNode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ids_round_trip() {
        for kind in NodeType::all() {
            assert_eq!(NodeType::from_type_id(kind.type_id()), Some(*kind));
            assert_eq!(NodeType::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(NodeType::from_type_id(3), None);
        assert_eq!(NodeType::from_type_id(0), None);
        assert_eq!(NodeType::Singleton.type_id(), 1);
        assert_eq!(NodeType::Join.type_id(), 35);
    }

    #[test]
    fn test_kind_classification() {
        assert!(NodeType::Collect.increases_depth());
        assert!(!NodeType::Collect.is_loop());
        assert!(NodeType::Traversal.is_loop());
        assert!(!NodeType::Calculation.always_copies_rows());
        assert!(NodeType::Filter.always_copies_rows());
        assert!(NodeType::Upsert.is_modification());
    }

    #[test]
    fn test_checked_downcast() {
        let node = ExecutionNode::new(
            NodeId(3),
            NodeData::Filter(FilterNode {
                in_variable: VariableId(0),
            }),
        );
        assert!(node.as_filter().is_ok());
        assert_eq!(
            node.as_calculation().unwrap_err(),
            PlanError::WrongNodeType {
                id: NodeId(3),
                expected: NodeType::Calculation,
                actual: NodeType::Filter,
            }
        );
    }

    #[test]
    fn test_checked_mutable_downcast() {
        let mut node = ExecutionNode::new(
            NodeId(5),
            NodeData::Filter(FilterNode {
                in_variable: VariableId(0),
            }),
        );
        node.as_filter_mut().unwrap().in_variable = VariableId(2);
        assert_eq!(node.as_filter().unwrap().in_variable, VariableId(2));
        assert_eq!(
            node.as_limit_mut().unwrap_err(),
            PlanError::WrongNodeType {
                id: NodeId(5),
                expected: NodeType::Limit,
                actual: NodeType::Filter,
            }
        );
    }

    #[test]
    fn test_analysis_state_requires_passes() {
        let node = ExecutionNode::new(NodeId(1), NodeData::Singleton);
        assert_eq!(
            node.vars_used_later().unwrap_err(),
            PlanError::VarUsageNotComputed(NodeId(1))
        );
        assert_eq!(
            node.regs_to_clear().unwrap_err(),
            PlanError::RegistersNotPlanned(NodeId(1))
        );
    }
}
