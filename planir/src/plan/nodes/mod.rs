// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Node payloads
//!
//! [`NodeData`] is the closed set of node kinds. Each variant carries the
//! fields specific to that kind; graph structure and analysis results live on
//! [`crate::plan::node::ExecutionNode`].

pub mod basic;
pub mod cluster;
pub mod collect;
pub mod graph;
pub mod modification;
pub mod subquery;

pub use basic::*;
pub use cluster::*;
pub use collect::*;
pub use graph::*;
pub use modification::*;
pub use subquery::*;

use crate::error::{PlanError, PlanResult};
use crate::plan::node::{NodeId, NodeType};
use crate::variable::{VarSet, VariableId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Singleton,
    EnumerateCollection(EnumerateCollectionNode),
    EnumerateList(EnumerateListNode),
    Filter(FilterNode),
    Limit(LimitNode),
    Calculation(CalculationNode),
    Subquery(SubqueryNode),
    Sort(SortNode),
    Collect(CollectNode),
    Scatter(ScatterNode),
    Gather(GatherNode),
    Remote(RemoteNode),
    Insert(ModificationNode),
    Remove(ModificationNode),
    Replace(ModificationNode),
    Update(ModificationNode),
    Upsert(UpsertNode),
    Return(ReturnNode),
    NoResults,
    Distribute(DistributeNode),
    Traversal(TraversalNode),
    Index(IndexNode),
    ShortestPath(ShortestPathNode),
    KShortestPaths(KShortestPathsNode),
    SingleRemoteOperation(SingleRemoteOperationNode),
    EnumerateView(EnumerateViewNode),
    DistributeConsumer(DistributeConsumerNode),
    SubqueryStart,
    SubqueryEnd(SubqueryEndNode),
    Materialize(MaterializeNode),
    Async,
    Mutex,
    Window(WindowNode),
    Join(JoinNode),
}

impl NodeData {
    pub fn kind(&self) -> NodeType {
        match self {
            NodeData::Singleton => NodeType::Singleton,
            NodeData::EnumerateCollection(_) => NodeType::EnumerateCollection,
            NodeData::EnumerateList(_) => NodeType::EnumerateList,
            NodeData::Filter(_) => NodeType::Filter,
            NodeData::Limit(_) => NodeType::Limit,
            NodeData::Calculation(_) => NodeType::Calculation,
            NodeData::Subquery(_) => NodeType::Subquery,
            NodeData::Sort(_) => NodeType::Sort,
            NodeData::Collect(_) => NodeType::Collect,
            NodeData::Scatter(_) => NodeType::Scatter,
            NodeData::Gather(_) => NodeType::Gather,
            NodeData::Remote(_) => NodeType::Remote,
            NodeData::Insert(_) => NodeType::Insert,
            NodeData::Remove(_) => NodeType::Remove,
            NodeData::Replace(_) => NodeType::Replace,
            NodeData::Update(_) => NodeType::Update,
            NodeData::Upsert(_) => NodeType::Upsert,
            NodeData::Return(_) => NodeType::Return,
            NodeData::NoResults => NodeType::NoResults,
            NodeData::Distribute(_) => NodeType::Distribute,
            NodeData::Traversal(_) => NodeType::Traversal,
            NodeData::Index(_) => NodeType::Index,
            NodeData::ShortestPath(_) => NodeType::ShortestPath,
            NodeData::KShortestPaths(_) => NodeType::KShortestPaths,
            NodeData::SingleRemoteOperation(_) => NodeType::SingleRemoteOperation,
            NodeData::EnumerateView(_) => NodeType::EnumerateView,
            NodeData::DistributeConsumer(_) => NodeType::DistributeConsumer,
            NodeData::SubqueryStart => NodeType::SubqueryStart,
            NodeData::SubqueryEnd(_) => NodeType::SubqueryEnd,
            NodeData::Materialize(_) => NodeType::Materialize,
            NodeData::Async => NodeType::Async,
            NodeData::Mutex => NodeType::Mutex,
            NodeData::Window(_) => NodeType::Window,
            NodeData::Join(_) => NodeType::Join,
        }
    }

    /// Variables this node produces
    pub fn variables_set_here(&self) -> Vec<VariableId> {
        match self {
            NodeData::EnumerateCollection(n) => vec![n.out_variable],
            NodeData::EnumerateList(n) => vec![n.out_variable],
            NodeData::Calculation(n) => vec![n.out_variable],
            NodeData::Subquery(n) => vec![n.out_variable],
            NodeData::Collect(n) => n.variables_set_here(),
            NodeData::Insert(n) | NodeData::Remove(n) | NodeData::Replace(n) | NodeData::Update(n) => {
                n.variables_set_here()
            }
            NodeData::Upsert(n) => n.out_new_variable.into_iter().collect(),
            NodeData::Traversal(n) => n.variables_set_here(),
            NodeData::Index(n) => vec![n.out_variable],
            NodeData::ShortestPath(n) => [n.vertex_out_variable, n.edge_out_variable]
                .into_iter()
                .flatten()
                .collect(),
            NodeData::KShortestPaths(n) => vec![n.path_out_variable],
            NodeData::SingleRemoteOperation(n) => n.out_variable.into_iter().collect(),
            NodeData::EnumerateView(n) => vec![n.out_variable],
            NodeData::SubqueryEnd(n) => vec![n.out_variable],
            NodeData::Materialize(n) => vec![n.out_variable],
            NodeData::Window(n) => n.aggregates.iter().map(|a| a.out_variable).collect(),
            NodeData::Join(n) => n.sources.iter().map(|s| s.out_variable).collect(),
            _ => Vec::new(),
        }
    }

    /// Variables read by this node that are visible from the payload alone.
    /// Classic subqueries and retain-all collects need the surrounding plan;
    /// see `ExecutionPlan::variables_used_here`.
    pub fn direct_used_variables(&self, vars: &mut VarSet) {
        match self {
            NodeData::EnumerateList(n) => {
                vars.insert(n.in_variable);
            }
            NodeData::Filter(n) => {
                vars.insert(n.in_variable);
            }
            NodeData::Calculation(n) => n.expression.referenced_variables(vars),
            NodeData::Sort(n) => vars.extend(n.elements.iter().map(|e| e.in_variable)),
            NodeData::Gather(n) => vars.extend(n.elements.iter().map(|e| e.in_variable)),
            NodeData::Collect(n) => n.direct_used_variables(vars),
            NodeData::Distribute(n) => {
                vars.insert(n.variable);
            }
            NodeData::Insert(n) | NodeData::Remove(n) | NodeData::Replace(n) | NodeData::Update(n) => {
                n.used_variables(vars)
            }
            NodeData::Upsert(n) => n.used_variables(vars),
            NodeData::Return(n) => {
                vars.insert(n.in_variable);
            }
            NodeData::Traversal(n) => n.used_variables(vars),
            NodeData::Index(n) => {
                if let Some(condition) = &n.condition {
                    let mut inner = VarSet::new();
                    condition.referenced_variables(&mut inner);
                    inner.remove(&n.out_variable);
                    vars.extend(inner);
                }
            }
            NodeData::EnumerateView(n) => {
                if let Some(search) = &n.search {
                    let mut inner = VarSet::new();
                    search.referenced_variables(&mut inner);
                    inner.remove(&n.out_variable);
                    vars.extend(inner);
                }
            }
            NodeData::ShortestPath(n) => {
                vars.extend(n.start.variable);
                vars.extend(n.target.variable);
            }
            NodeData::KShortestPaths(n) => {
                vars.extend(n.start.variable);
                vars.extend(n.target.variable);
            }
            NodeData::SingleRemoteOperation(n) => vars.extend(n.in_variable),
            NodeData::SubqueryEnd(n) => vars.extend(n.in_variable),
            NodeData::Materialize(n) => {
                vars.insert(n.in_variable);
            }
            NodeData::Window(n) => {
                vars.extend(n.range_variable);
                vars.extend(n.aggregates.iter().filter_map(|a| a.in_variable));
            }
            NodeData::Join(n) => n.used_variables(vars),
            _ => {}
        }
    }

    /// Determinism judged from the payload alone; classic subqueries are
    /// resolved by the plan
    pub fn is_locally_deterministic(&self) -> bool {
        match self {
            NodeData::Calculation(n) => n.expression.is_deterministic(),
            NodeData::EnumerateCollection(n) => !n.random,
            NodeData::Index(n) => n.condition.as_ref().map_or(true, |c| c.is_deterministic()),
            NodeData::EnumerateView(n) => n.search.as_ref().map_or(true, |c| c.is_deterministic()),
            _ => true,
        }
    }

    /// Names of functions called by node expressions
    pub fn function_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        match self {
            NodeData::Calculation(n) => n.expression.function_names(&mut names),
            NodeData::Index(n) => {
                if let Some(condition) = &n.condition {
                    condition.function_names(&mut names);
                }
            }
            NodeData::EnumerateView(n) => {
                if let Some(search) = &n.search {
                    search.function_names(&mut names);
                }
            }
            _ => {}
        }
        names
    }

    /// Every variable stored in the payload, set or read
    pub fn payload_variables(&self) -> VarSet {
        let mut vars = VarSet::new();
        self.direct_used_variables(&mut vars);
        vars.extend(self.variables_set_here());
        match self {
            NodeData::Traversal(n) => {
                vars.insert(n.tmp_variable);
                if let Some(condition) = &n.condition {
                    condition.referenced_variables(&mut vars);
                }
            }
            NodeData::Index(n) => {
                if let Some(condition) = &n.condition {
                    condition.referenced_variables(&mut vars);
                }
            }
            NodeData::Collect(n) => vars.extend(n.keep_variables.iter().copied()),
            _ => {}
        }
        vars
    }

    /// Root of a nested classic subquery plan
    pub fn subquery_root(&self) -> Option<NodeId> {
        match self {
            NodeData::Subquery(n) => Some(n.subquery),
            _ => None,
        }
    }

    /// Payload as a JSON object; unit kinds produce an empty object
    pub fn payload_to_json(&self) -> PlanResult<Map<String, Value>> {
        let value = match self {
            NodeData::Singleton
            | NodeData::NoResults
            | NodeData::SubqueryStart
            | NodeData::Async
            | NodeData::Mutex => return Ok(Map::new()),
            NodeData::EnumerateCollection(n) => to_value(n)?,
            NodeData::EnumerateList(n) => to_value(n)?,
            NodeData::Filter(n) => to_value(n)?,
            NodeData::Limit(n) => to_value(n)?,
            NodeData::Calculation(n) => to_value(n)?,
            NodeData::Subquery(n) => to_value(n)?,
            NodeData::Sort(n) => to_value(n)?,
            NodeData::Collect(n) => to_value(n)?,
            NodeData::Scatter(n) => to_value(n)?,
            NodeData::Gather(n) => to_value(n)?,
            NodeData::Remote(n) => to_value(n)?,
            NodeData::Insert(n) | NodeData::Remove(n) | NodeData::Replace(n) | NodeData::Update(n) => {
                to_value(n)?
            }
            NodeData::Upsert(n) => to_value(n)?,
            NodeData::Return(n) => to_value(n)?,
            NodeData::Distribute(n) => to_value(n)?,
            NodeData::Traversal(n) => to_value(n)?,
            NodeData::Index(n) => to_value(n)?,
            NodeData::ShortestPath(n) => to_value(n)?,
            NodeData::KShortestPaths(n) => to_value(n)?,
            NodeData::SingleRemoteOperation(n) => to_value(n)?,
            NodeData::EnumerateView(n) => to_value(n)?,
            NodeData::DistributeConsumer(n) => to_value(n)?,
            NodeData::SubqueryEnd(n) => to_value(n)?,
            NodeData::Materialize(n) => to_value(n)?,
            NodeData::Window(n) => to_value(n)?,
            NodeData::Join(n) => to_value(n)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(PlanError::Malformed(format!(
                "payload of {} did not serialize to an object: {}",
                self.kind(),
                other
            ))),
        }
    }

    /// Rebuild a payload of `kind` from a node document
    pub fn from_json(kind: NodeType, doc: &Value) -> PlanResult<NodeData> {
        Ok(match kind {
            NodeType::Singleton => NodeData::Singleton,
            NodeType::NoResults => NodeData::NoResults,
            NodeType::SubqueryStart => NodeData::SubqueryStart,
            NodeType::Async => NodeData::Async,
            NodeType::Mutex => NodeData::Mutex,
            NodeType::EnumerateCollection => NodeData::EnumerateCollection(parse(kind, doc)?),
            NodeType::EnumerateList => NodeData::EnumerateList(parse(kind, doc)?),
            NodeType::Filter => NodeData::Filter(parse(kind, doc)?),
            NodeType::Limit => NodeData::Limit(parse(kind, doc)?),
            NodeType::Calculation => NodeData::Calculation(parse(kind, doc)?),
            NodeType::Subquery => NodeData::Subquery(parse(kind, doc)?),
            NodeType::Sort => NodeData::Sort(parse(kind, doc)?),
            NodeType::Collect => NodeData::Collect(parse(kind, doc)?),
            NodeType::Scatter => NodeData::Scatter(parse(kind, doc)?),
            NodeType::Gather => NodeData::Gather(parse(kind, doc)?),
            NodeType::Remote => NodeData::Remote(parse(kind, doc)?),
            NodeType::Insert => NodeData::Insert(parse(kind, doc)?),
            NodeType::Remove => NodeData::Remove(parse(kind, doc)?),
            NodeType::Replace => NodeData::Replace(parse(kind, doc)?),
            NodeType::Update => NodeData::Update(parse(kind, doc)?),
            NodeType::Upsert => NodeData::Upsert(parse(kind, doc)?),
            NodeType::Return => NodeData::Return(parse(kind, doc)?),
            NodeType::Distribute => NodeData::Distribute(parse(kind, doc)?),
            NodeType::Traversal => NodeData::Traversal(parse(kind, doc)?),
            NodeType::Index => NodeData::Index(parse(kind, doc)?),
            NodeType::ShortestPath => NodeData::ShortestPath(parse(kind, doc)?),
            NodeType::KShortestPaths => NodeData::KShortestPaths(parse(kind, doc)?),
            NodeType::SingleRemoteOperation => NodeData::SingleRemoteOperation(parse(kind, doc)?),
            NodeType::EnumerateView => NodeData::EnumerateView(parse(kind, doc)?),
            NodeType::DistributeConsumer => NodeData::DistributeConsumer(parse(kind, doc)?),
            NodeType::SubqueryEnd => NodeData::SubqueryEnd(parse(kind, doc)?),
            NodeType::Materialize => NodeData::Materialize(parse(kind, doc)?),
            NodeType::Window => NodeData::Window(parse(kind, doc)?),
            NodeType::Join => NodeData::Join(parse(kind, doc)?),
        })
    }
}

fn to_value<T: Serialize>(payload: &T) -> PlanResult<Value> {
    Ok(serde_json::to_value(payload)?)
}

fn parse<T: DeserializeOwned>(kind: NodeType, doc: &Value) -> PlanResult<T> {
    serde_json::from_value(doc.clone())
        .map_err(|e| PlanError::Malformed(format!("invalid {} node: {}", kind, e)))
}
