// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression subsystem: expression trees, planning-time folding and filter conditions

#[allow(clippy::module_inception)]
mod ast;
pub use ast::*;
pub mod condition;
pub mod evaluate;

pub use condition::Condition;
