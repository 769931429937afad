// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan documents
//!
//! A plan serializes to a JSON document of the form
//!
//! ```text
//! { "nodes": [...], "rootId": 7, "variables": [{"id": 0, "name": "x"}], "appliedRules": [] }
//! ```
//!
//! Nodes are listed dependencies first; the nested plan of a classic
//! subquery precedes its Subquery node. Every node carries `type`, `typeID`,
//! `id` and `dependencies` plus its payload fields; further attributes depend
//! on [`SerializeFlags`]. Reading a document back and serializing it with the
//! same flags yields the same document.

use crate::config::{PlannerConfig, Statistics};
use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId, NodeRegisters, NodeType, VarUsage};
use crate::plan::nodes::NodeData;
use crate::plan::register_plan::{RegIdSet, RegisterId};
use crate::variable::{VarSet, VarSetStack, Variable, VariableId};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Optional parts of a node document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeFlags(u32);

impl SerializeFlags {
    pub const NONE: SerializeFlags = SerializeFlags(0);
    pub const PARENTS: SerializeFlags = SerializeFlags(1);
    pub const ESTIMATES: SerializeFlags = SerializeFlags(2);
    pub const DETAILS: SerializeFlags = SerializeFlags(4);
    pub const FUNCTIONS: SerializeFlags = SerializeFlags(8);
    pub const REGISTER_INFORMATION: SerializeFlags = SerializeFlags(16);

    pub fn all() -> Self {
        Self(31)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    pub fn contains(&self, other: SerializeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SerializeFlags {
    type Output = SerializeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SerializeFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for SerializeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07b}", self.0)
    }
}

impl ExecutionPlan {
    /// Serialize all nodes reachable from the root
    pub fn to_json(&self, flags: SerializeFlags) -> PlanResult<Value> {
        let root = self.root()?;
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        self.serialize_subtree(root, flags, &mut seen, &mut nodes)?;

        let variables: Vec<Value> = self
            .variables
            .iter()
            .map(|v| json!({"id": v.id, "name": v.name}))
            .collect();

        Ok(json!({
            "nodes": nodes,
            "rootId": root,
            "variables": variables,
            "appliedRules": self.applied_rules,
        }))
    }

    fn serialize_subtree(
        &self,
        id: NodeId,
        flags: SerializeFlags,
        seen: &mut HashSet<NodeId>,
        out: &mut Vec<Value>,
    ) -> PlanResult<()> {
        if !seen.insert(id) {
            return Ok(());
        }
        let node = self.node(id)?;
        for dep in node.dependencies() {
            self.serialize_subtree(*dep, flags, seen, out)?;
        }
        if let Some(sub) = node.data().subquery_root() {
            self.serialize_subtree(sub, flags, seen, out)?;
        }
        out.push(Value::Object(self.node_to_json(node, flags)?));
        Ok(())
    }

    fn node_to_json(&self, node: &ExecutionNode, flags: SerializeFlags) -> PlanResult<Map<String, Value>> {
        let mut doc = Map::new();
        doc.insert("type".into(), json!(node.kind().name()));
        doc.insert("typeID".into(), json!(node.kind().type_id()));
        doc.insert("id".into(), json!(node.id()));
        doc.insert("dependencies".into(), json!(node.dependencies()));

        if flags.contains(SerializeFlags::PARENTS) {
            doc.insert("parents".into(), json!(node.parents()));
        }
        if flags.contains(SerializeFlags::ESTIMATES) {
            let estimate = self.get_cost(node.id())?;
            doc.insert("estimatedCost".into(), json!(estimate.estimated_cost));
            doc.insert("estimatedNrItems".into(), json!(estimate.estimated_nr_items));
        }
        if flags.contains(SerializeFlags::DETAILS) {
            doc.insert("isInSplicedSubquery".into(), json!(node.is_in_spliced_subquery()));
            doc.insert("isDeterministic".into(), json!(self.is_deterministic(node.id())?));
            doc.insert("alwaysCopiesRows".into(), json!(node.kind().always_copies_rows()));
        }
        if flags.contains(SerializeFlags::FUNCTIONS) {
            doc.insert("functions".into(), json!(node.data().function_names()));
        }
        if flags.contains(SerializeFlags::REGISTER_INFORMATION) {
            if let Some(usage) = &node.var_usage {
                doc.insert("varsUsedLaterStack".into(), json!(usage.used_later));
                doc.insert("varsValidStack".into(), json!(usage.valid));
            }
            if let Some(registers) = &node.registers {
                doc.insert("depth".into(), json!(registers.depth));
                doc.insert("regsToClear".into(), json!(registers.regs_to_clear));
                doc.insert("regsToKeepStack".into(), json!(registers.regs_to_keep));
            }
            doc.insert("varsUsedHere".into(), json!(self.variables_used_here(node.id())?));
            doc.insert("varsSetHere".into(), json!(node.variables_set_here()));
        }

        for (key, value) in node.data().payload_to_json()? {
            doc.insert(key, value);
        }
        Ok(doc)
    }

    /// Rebuild a plan from a document produced by [`Self::to_json`]
    pub fn from_json(doc: &Value, statistics: Arc<Statistics>, config: PlannerConfig) -> PlanResult<ExecutionPlan> {
        let mut plan = ExecutionPlan::new(statistics, config);

        for entry in array(doc, "variables")? {
            let id: VariableId = serde_json::from_value(field(entry, "id")?.clone())?;
            let name = field(entry, "name")?
                .as_str()
                .ok_or_else(|| malformed("variable name needs to be a string"))?;
            plan.variables.create_variable_from(&Variable::new(id, name));
        }

        let node_docs = array(doc, "nodes")?;

        // first pass: nodes and their own state
        for node_doc in node_docs {
            let type_id = field(node_doc, "typeID")?
                .as_u64()
                .ok_or_else(|| malformed("typeID needs to be an unsigned integer"))?;
            let kind = NodeType::from_type_id(type_id).ok_or(PlanError::UnknownNodeType(type_id))?;
            let id: NodeId = serde_json::from_value(field(node_doc, "id")?.clone())?;
            let data = NodeData::from_json(kind, node_doc)?;
            for var in data.payload_variables() {
                if !plan.variables.contains(var) {
                    return Err(PlanError::UnknownVariable(var));
                }
            }

            let mut node = ExecutionNode::new(id, data);
            node.var_usage = read_var_usage(&plan, node_doc)?;
            node.registers = read_registers(node_doc)?;
            node.in_spliced_subquery = node_doc
                .get("isInSplicedSubquery")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            plan.register_node(node)?;
        }

        // second pass: edges in document order
        for node_doc in node_docs {
            let id: NodeId = serde_json::from_value(field(node_doc, "id")?.clone())?;
            let deps: Vec<NodeId> = serde_json::from_value(field(node_doc, "dependencies")?.clone())?;
            for dep in deps {
                if !plan.contains_node(dep) {
                    return Err(malformed(format!("node {} depends on unknown node {}", id, dep)));
                }
                plan.add_dependency(id, dep)?;
            }
        }
        for node_doc in node_docs {
            if let Some(parents) = node_doc.get("parents") {
                let id: NodeId = serde_json::from_value(field(node_doc, "id")?.clone())?;
                let parents: Vec<NodeId> = serde_json::from_value(parents.clone())?;
                let node = plan.node_mut(id)?;
                let expected: BTreeSet<NodeId> = node.parents.iter().copied().collect();
                let actual: BTreeSet<NodeId> = parents.iter().copied().collect();
                if expected != actual || parents.len() != node.parents.len() {
                    return Err(malformed(format!("parents of node {} do not match dependencies", id)));
                }
                node.parents = parents;
            }
        }

        for node in plan.nodes.values() {
            if let Some(sub) = node.data().subquery_root() {
                if !plan.nodes.contains_key(&sub) {
                    return Err(malformed(format!("subquery of node {} not found: {}", node.id(), sub)));
                }
            }
        }

        match field(doc, "rootId")? {
            Value::Null => {}
            root => {
                let root: NodeId = serde_json::from_value(root.clone())?;
                plan.set_root(root)
                    .map_err(|_| malformed(format!("root node {} not found", root)))?;
            }
        }

        if let Some(rules) = doc.get("appliedRules") {
            plan.applied_rules = serde_json::from_value(rules.clone())?;
        }

        if plan.nodes.values().any(|n| n.var_usage.is_some()) {
            plan.var_usage_computed = true;
            let setters: Vec<(VariableId, NodeId)> = plan
                .nodes
                .values()
                .flat_map(|n| n.variables_set_here().into_iter().map(move |v| (v, n.id())))
                .collect();
            plan.var_set_by.extend(setters);
        }

        log::debug!("restored plan with {} nodes", plan.len());
        Ok(plan)
    }
}

fn malformed(message: impl Into<String>) -> PlanError {
    PlanError::Malformed(message.into())
}

fn field<'a>(doc: &'a Value, name: &str) -> PlanResult<&'a Value> {
    doc.get(name)
        .ok_or_else(|| malformed(format!("missing attribute \"{}\"", name)))
}

fn array<'a>(doc: &'a Value, name: &str) -> PlanResult<&'a Vec<Value>> {
    field(doc, name)?
        .as_array()
        .ok_or_else(|| malformed(format!("\"{}\" needs to be an array", name)))
}

fn read_stack(plan: &ExecutionPlan, doc: &Value, name: &str) -> PlanResult<VarSetStack> {
    let frames = array(doc, name)?;
    if frames.is_empty() {
        return Err(malformed(format!("\"{}\" needs to be a non-empty array", name)));
    }
    let mut stack = Vec::with_capacity(frames.len());
    for frame in frames {
        let vars: VarSet = serde_json::from_value(frame.clone())
            .map_err(|_| malformed(format!("\"{}\" needs to contain arrays of variable ids", name)))?;
        if let Some(unknown) = vars.iter().find(|v| !plan.variables.contains(**v)) {
            return Err(PlanError::UnknownVariable(*unknown));
        }
        stack.push(vars);
    }
    Ok(stack)
}

fn read_var_usage(plan: &ExecutionPlan, doc: &Value) -> PlanResult<Option<VarUsage>> {
    if doc.get("varsUsedLaterStack").is_none() && doc.get("varsValidStack").is_none() {
        return Ok(None);
    }
    Ok(Some(VarUsage {
        used_later: read_stack(plan, doc, "varsUsedLaterStack")?,
        valid: read_stack(plan, doc, "varsValidStack")?,
    }))
}

fn read_registers(doc: &Value) -> PlanResult<Option<NodeRegisters>> {
    let Some(clear) = doc.get("regsToClear") else {
        return Ok(None);
    };
    let regs_to_clear: RegIdSet = serde_json::from_value(clear.clone())?;
    let regs_to_keep: Vec<BTreeSet<RegisterId>> = match doc.get("regsToKeepStack") {
        Some(keep) => serde_json::from_value(keep.clone())?,
        None => Vec::new(),
    };
    let depth = match doc.get("depth") {
        Some(depth) => depth
            .as_u64()
            .ok_or_else(|| malformed("depth needs to be an unsigned integer"))? as usize,
        None => 0,
    };
    Ok(Some(NodeRegisters {
        depth,
        regs_to_clear,
        regs_to_keep,
    }))
}
