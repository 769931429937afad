//! Test utilities for planir integration tests
//!
//! `PlanBuilder` chains nodes into a linear plan; the fixture functions
//! build the plan shapes most tests share.

#![allow(dead_code)]

use planir::ast::{Expression, Operator};
use planir::config::{PlannerConfig, Statistics};
use planir::plan::nodes::*;
use planir::plan::{ExecutionPlan, NodeData, NodeId};
use planir::variable::VariableId;
use serde_json::json;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn statistics() -> Arc<Statistics> {
    Arc::new(
        Statistics::new()
            .with_collection("users", 1000)
            .with_collection("orders", 50)
            .with_index("users_age", 0.1),
    )
}

/// Builds a plan bottom-up, each node depending on the previous one
pub struct PlanBuilder {
    pub plan: ExecutionPlan,
    last: Option<NodeId>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self {
            plan: ExecutionPlan::new(statistics(), config),
            last: None,
        }
    }

    pub fn var(&mut self, name: &str) -> VariableId {
        self.plan.variables_mut().create_variable(name)
    }

    pub fn tmp(&mut self) -> VariableId {
        self.plan.variables_mut().create_temporary_variable()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Append a node on top of the current chain
    pub fn then(&mut self, data: NodeData) -> NodeId {
        let id = self.plan.create_node(data);
        if let Some(previous) = self.last {
            self.plan
                .add_dependency(id, previous)
                .expect("Failed to link node");
        }
        self.last = Some(id);
        id
    }

    /// Start a new chain, e.g. for a subquery
    pub fn restart(&mut self) -> Option<NodeId> {
        self.last.take()
    }

    pub fn resume(&mut self, last: Option<NodeId>) {
        self.last = last;
    }

    pub fn finish(mut self) -> ExecutionPlan {
        let root = self.last.expect("Plan has no nodes");
        self.plan.set_root(root).expect("Failed to set root");
        self.plan
    }
}

pub fn calculation(out_variable: VariableId, expression: Expression) -> NodeData {
    NodeData::Calculation(CalculationNode {
        out_variable,
        expression,
    })
}

pub fn filter(in_variable: VariableId) -> NodeData {
    NodeData::Filter(FilterNode { in_variable })
}

pub fn ret(in_variable: VariableId) -> NodeData {
    NodeData::Return(ReturnNode {
        in_variable,
        count: false,
    })
}

pub fn enumerate_collection(collection: &str, out_variable: VariableId) -> NodeData {
    NodeData::EnumerateCollection(EnumerateCollectionNode {
        collection: collection.to_string(),
        out_variable,
        random: false,
        count_only: false,
    })
}

pub fn enumerate_list(in_variable: VariableId, out_variable: VariableId) -> NodeData {
    NodeData::EnumerateList(EnumerateListNode {
        in_variable,
        out_variable,
    })
}

pub fn limit(offset: usize, limit: usize) -> NodeData {
    NodeData::Limit(LimitNode {
        offset,
        limit,
        full_count: false,
    })
}

pub fn sort(in_variable: VariableId) -> NodeData {
    NodeData::Sort(SortNode {
        elements: vec![SortElement::new(in_variable, true)],
        stable: false,
    })
}

/// Variables of [`collection_plan`]
pub struct CollectionVars {
    pub doc: VariableId,
    pub cond: VariableId,
}

/// FOR doc IN users FILTER doc.age > 18 SORT doc LIMIT 10 RETURN doc
pub fn collection_plan() -> (ExecutionPlan, CollectionVars) {
    let mut builder = PlanBuilder::new();
    let doc = builder.var("doc");
    let cond = builder.tmp();
    builder.then(NodeData::Singleton);
    builder.then(enumerate_collection("users", doc));
    builder.then(calculation(
        cond,
        Expression::compare(
            Expression::property(Expression::reference(doc), "age"),
            Operator::GreaterThan,
            Expression::literal(18),
        ),
    ));
    builder.then(filter(cond));
    builder.then(sort(doc));
    builder.then(limit(0, 10));
    builder.then(ret(doc));
    (builder.finish(), CollectionVars { doc, cond })
}

/// Variables and nodes of [`subquery_plan`]
pub struct SubqueryVars {
    pub list: VariableId,
    pub x: VariableId,
    pub y: VariableId,
    pub sub_result: VariableId,
    pub subquery: NodeId,
    pub sub_root: NodeId,
}

/// LET list = [1, 2, 3] FOR x IN list LET s = (LET y = x == 1 RETURN y) RETURN s
pub fn subquery_plan() -> (ExecutionPlan, SubqueryVars) {
    let mut builder = PlanBuilder::new();
    let list = builder.var("list");
    let x = builder.var("x");
    let y = builder.var("y");
    let sub_result = builder.var("s");

    builder.then(NodeData::Singleton);
    builder.then(calculation(list, Expression::literal(json!([1, 2, 3]))));
    builder.then(enumerate_list(list, x));
    let outer = builder.restart();

    builder.then(NodeData::Singleton);
    builder.then(calculation(
        y,
        Expression::compare(Expression::reference(x), Operator::Equal, Expression::literal(1)),
    ));
    let sub_root = builder.then(ret(y));

    builder.resume(outer);
    let subquery = builder.then(NodeData::Subquery(SubqueryNode {
        subquery: sub_root,
        out_variable: sub_result,
    }));
    builder.then(ret(sub_result));
    (
        builder.finish(),
        SubqueryVars {
            list,
            x,
            y,
            sub_result,
            subquery,
            sub_root,
        },
    )
}

/// Variables and nodes of [`spliced_subquery_plan`], listed root-down
pub struct SplicedVars {
    pub o: VariableId,
    pub u: VariableId,
    pub x: VariableId,
    pub s: VariableId,
    pub root: NodeId,
    pub end: NodeId,
    pub calc: NodeId,
    pub inner_enum: NodeId,
    pub start: NodeId,
    pub outer_enum: NodeId,
    pub singleton: NodeId,
}

/// FOR o IN orders LET s = (FOR u IN users LET x = o.id == u.owner RETURN x)
/// RETURN s, with the subquery spliced between SubqueryStart and SubqueryEnd
pub fn spliced_subquery_plan() -> (ExecutionPlan, SplicedVars) {
    let mut builder = PlanBuilder::new();
    let o = builder.var("o");
    let u = builder.var("u");
    let x = builder.var("x");
    let s = builder.var("s");

    let singleton = builder.then(NodeData::Singleton);
    let outer_enum = builder.then(enumerate_collection("orders", o));
    let start = builder.then(NodeData::SubqueryStart);
    let inner_enum = builder.then(enumerate_collection("users", u));
    let calc = builder.then(calculation(
        x,
        Expression::compare(
            Expression::property(Expression::reference(o), "id"),
            Operator::Equal,
            Expression::property(Expression::reference(u), "owner"),
        ),
    ));
    let end = builder.then(NodeData::SubqueryEnd(SubqueryEndNode {
        in_variable: Some(x),
        out_variable: s,
    }));
    let root = builder.then(ret(s));
    (
        builder.finish(),
        SplicedVars {
            o,
            u,
            x,
            s,
            root,
            end,
            calc,
            inner_enum,
            start,
            outer_enum,
            singleton,
        },
    )
}

/// Gather <- Remote x2 <- Scatter <- Singleton: two paths reconverge on one
/// Scatter node
pub fn diamond_plan() -> (ExecutionPlan, NodeId, [NodeId; 2], NodeId) {
    let mut plan = ExecutionPlan::new(statistics(), PlannerConfig::default());
    let singleton = plan.create_node(NodeData::Singleton);
    let scatter = plan.create_node(NodeData::Scatter(ScatterNode::default()));
    plan.add_dependency(scatter, singleton).unwrap();
    let remotes = ["db1", "db2"].map(|server| {
        let remote = plan.create_node(NodeData::Remote(RemoteNode {
            server: server.to_string(),
            query_id: String::new(),
        }));
        plan.add_dependency(remote, scatter).unwrap();
        remote
    });
    let gather = plan.create_node(NodeData::Gather(GatherNode::default()));
    for remote in remotes {
        plan.add_dependency(gather, remote).unwrap();
    }
    plan.set_root(gather).unwrap();
    (plan, gather, remotes, scatter)
}

/// Random linear plan of `len` extra nodes over a list enumeration; every
/// node only reads variables set below it
pub fn random_linear_plan(rng: &mut fastrand::Rng, len: usize) -> ExecutionPlan {
    let mut builder = PlanBuilder::new();
    let list = builder.var("list");
    let item = builder.var("item");
    builder.then(NodeData::Singleton);
    builder.then(calculation(list, Expression::literal(json!([1, 2, 3, 4]))));
    builder.then(enumerate_list(list, item));

    let mut live = vec![item];
    for i in 0..len {
        let source = live[rng.usize(..live.len())];
        match rng.u8(..4) {
            0 => {
                let out = builder.var(&format!("v{}", i));
                builder.then(calculation(
                    out,
                    Expression::compare(
                        Expression::reference(source),
                        Operator::LessThan,
                        Expression::literal(rng.i64(0..10)),
                    ),
                ));
                live.push(out);
            }
            1 => {
                builder.then(filter(source));
            }
            2 => {
                builder.then(sort(source));
            }
            _ => {
                builder.then(limit(rng.usize(0..3), rng.usize(1..20)));
            }
        }
    }
    let result = live[rng.usize(..live.len())];
    builder.then(ret(result));
    builder.finish()
}
