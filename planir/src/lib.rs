// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! planir - execution plan IR for a graph/document query planner
//!
//! A query is planned into a DAG of typed execution nodes held by an
//! [`ExecutionPlan`]. On top of the graph this crate provides:
//!
//! - **Cost estimation**: memoized per-node cost and row estimates
//! - **Liveness analysis**: which variables are valid and used later at each node
//! - **Register planning**: register slots, registers to clear and to keep
//! - **Walkers**: a visitor framework for analyses and rewrite rules
//! - **Optimizer**: rule driver with a condition pushdown rule for traversals
//! - **Serialization**: a JSON document format with a lossless round trip
//!
//! # Usage
//!
//! ```ignore
//! let mut plan = ExecutionPlan::new(Arc::new(Statistics::new()), PlannerConfig::default());
//! let singleton = plan.create_node(NodeData::Singleton);
//! let ret = plan.create_node(NodeData::Return(ReturnNode { in_variable: var, count: false }));
//! plan.add_dependency(ret, singleton)?;
//! plan.set_root(ret)?;
//!
//! let mut plan = Optimizer::default().optimize(plan)?;
//! plan.find_var_usage()?;
//! plan.plan_registers()?;
//! let document = plan.to_json(SerializeFlags::all())?;
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod executor;
pub mod optimizer;
pub mod plan;
pub mod variable;

pub use config::{PlannerConfig, Statistics};
pub use error::{PlanError, PlanResult};
pub use executor::ExecutorFactory;
pub use optimizer::Optimizer;
pub use plan::{
    CostEstimate, ExecutionNode, ExecutionPlan, NodeData, NodeId, NodeType, RegisterPlan,
    SerializeFlags, WalkerWorker,
};
pub use variable::{Variable, VariableId, VariableRegistry};

/// planir version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// planir crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
