// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution plans
//!
//! This module holds the plan graph and the analyses run on it: cost
//! estimation, variable liveness, register planning, walking, structural
//! verification and (de)serialization.

pub mod cost;
pub mod execution_plan;
pub mod liveness;
pub mod node;
pub mod nodes;
pub mod register_plan;
pub mod serialize;
pub mod verify;
pub mod walker;

pub use cost::{CostCache, CostEstimate};
pub use execution_plan::ExecutionPlan;
pub use node::{ExecutionNode, NodeId, NodeRegisters, NodeType, VarUsage};
pub use nodes::NodeData;
pub use register_plan::{RegIdSet, RegIdSetStack, RegisterId, RegisterPlan, VarInfo};
pub use serialize::SerializeFlags;
pub use walker::{walk, walk_subqueries_first, VisitedSet, WalkerUniqueness, WalkerWorker};
