// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan error types

use crate::plan::node::{NodeId, NodeType};
use crate::variable::VariableId;
use thiserror::Error;

/// Errors raised by plan construction, analysis and (de)serialization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Unknown execution node: {0}")]
    UnknownNode(NodeId),

    #[error("Execution node {0} is already registered in this plan")]
    DuplicateNode(NodeId),

    #[error("Unknown variable: {0}")]
    UnknownVariable(VariableId),

    #[error("Node {id} is a {actual} node, expected {expected}")]
    WrongNodeType {
        id: NodeId,
        expected: NodeType,
        actual: NodeType,
    },

    #[error("Variable usage has not been computed for node {0}")]
    VarUsageNotComputed(NodeId),

    #[error("Registers have not been planned for node {0}")]
    RegistersNotPlanned(NodeId),

    #[error("Missing register for variable {variable} at node {node} ({kind})")]
    MissingRegister {
        variable: VariableId,
        node: NodeId,
        kind: NodeType,
    },

    #[error("Node {node} is missing its mandatory {child}")]
    MissingChild { node: NodeId, child: &'static str },

    #[error("Plan has no root node")]
    NoRoot,

    #[error("Invalid plan structure: {0}")]
    InvalidStructure(String),

    #[error("Cannot clone node {0} with properties into its own plan")]
    CloneIntoSamePlan(NodeId),

    #[error("Malformed plan document: {0}")]
    Malformed(String),

    #[error("Unknown node type id: {0}")]
    UnknownNodeType(u64),

    #[error("Optimizer rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },
}

impl From<serde_json::Error> for PlanError {
    fn from(error: serde_json::Error) -> Self {
        PlanError::Malformed(error.to_string())
    }
}

/// Result alias used throughout the crate
pub type PlanResult<T> = Result<T, PlanError>;
