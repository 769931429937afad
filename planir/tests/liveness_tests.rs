//! Variable liveness tests

#[path = "testutils/mod.rs"]
mod testutils;

use planir::ast::{Expression, Operator};
use planir::plan::nodes::{CollectNode, GroupVarInfo};
use planir::plan::{NodeData, NodeId};
use planir::variable::{VarSet, VariableId};
use planir::PlanError;
use testutils::*;

fn set(vars: &[VariableId]) -> VarSet {
    vars.iter().copied().collect()
}

/// Nodes of a linear plan from the root down
fn chain(plan: &planir::ExecutionPlan) -> Vec<NodeId> {
    plan.get_dependency_chain(plan.root().unwrap(), true).unwrap()
}

#[test]
fn test_used_later_and_valid() {
    init_logging();
    let (mut plan, vars) = collection_plan();
    plan.find_var_usage().unwrap();
    assert!(plan.is_var_usage_computed());

    // Return, Limit, Sort, Filter, Calculation, EnumerateCollection, Singleton
    let nodes = chain(&plan);
    let filter = plan.node(nodes[3]).unwrap();
    let calculation = plan.node(nodes[4]).unwrap();
    let enumerate = plan.node(nodes[5]).unwrap();

    assert_eq!(filter.vars_used_later().unwrap().last().unwrap(), &set(&[vars.doc]));
    assert_eq!(
        calculation.vars_used_later().unwrap().last().unwrap(),
        &set(&[vars.doc, vars.cond])
    );
    assert_eq!(enumerate.vars_valid().unwrap().last().unwrap(), &set(&[vars.doc]));
    assert_eq!(
        calculation.vars_valid().unwrap().last().unwrap(),
        &set(&[vars.doc, vars.cond])
    );

    assert_eq!(plan.get_var_set_by(vars.doc), Some(nodes[5]));
    assert_eq!(plan.get_var_set_by(vars.cond), Some(nodes[4]));
}

#[test]
fn test_var_usage_required_before_access() {
    let (plan, _) = collection_plan();
    let root = plan.root().unwrap();
    assert!(matches!(
        plan.node(root).unwrap().vars_used_later(),
        Err(PlanError::VarUsageNotComputed(_))
    ));
}

#[test]
fn test_invalidate_var_usage() {
    let (mut plan, _) = collection_plan();
    plan.find_var_usage().unwrap();
    plan.invalidate_var_usage();
    assert!(!plan.is_var_usage_computed());
    assert!(plan.nodes().all(|n| !n.is_var_usage_valid()));
}

#[test]
fn test_subquery_reports_outer_variables() {
    let (mut plan, vars) = subquery_plan();
    assert_eq!(plan.variables_used_here(vars.subquery).unwrap(), set(&[vars.x]));

    plan.find_var_usage().unwrap();
    let enumerate = plan.node(vars.subquery).unwrap().dependencies()[0];
    let used_later = plan.node(enumerate).unwrap().vars_used_later().unwrap();
    assert_eq!(used_later.last().unwrap(), &set(&[vars.x, vars.sub_result]));
}

#[test]
fn test_subquery_nodes_see_outer_scope() {
    let (mut plan, vars) = subquery_plan();
    plan.find_var_usage().unwrap();

    let inner_calculation = plan.node(vars.sub_root).unwrap().dependencies()[0];
    let valid = plan.node(inner_calculation).unwrap().vars_valid().unwrap();
    assert_eq!(valid.last().unwrap(), &set(&[vars.list, vars.x, vars.y]));
    assert_eq!(plan.get_var_set_by(vars.y), Some(inner_calculation));
}

#[test]
fn test_variables_used_here_excludes_set_here() {
    let mut builder = PlanBuilder::new();
    let a = builder.var("a");
    builder.then(NodeData::Singleton);
    // a = a == 1 reads and writes the same variable
    let calc = builder.then(calculation(
        a,
        Expression::compare(Expression::reference(a), Operator::Equal, Expression::literal(1)),
    ));
    let plan = builder.finish();
    assert!(plan.variables_used_here(calc).unwrap().is_empty());
}

#[test]
fn test_collect_into_keeps_user_variables() {
    let mut builder = PlanBuilder::new();
    let doc = builder.var("doc");
    let age = builder.var("age");
    let tmp = builder.tmp();
    let key = builder.var("key");
    let groups = builder.var("groups");
    builder.then(NodeData::Singleton);
    builder.then(enumerate_collection("users", doc));
    builder.then(calculation(
        age,
        Expression::property(Expression::reference(doc), "age"),
    ));
    builder.then(calculation(tmp, Expression::literal(true)));
    let collect = builder.then(NodeData::Collect(CollectNode::grouping(
        vec![GroupVarInfo {
            out_variable: key,
            in_variable: age,
        }],
        Some(groups),
    )));
    builder.then(ret(groups));
    let plan = builder.finish();

    assert_eq!(plan.variables_used_here(collect).unwrap(), set(&[doc, age]));
}

#[test]
fn test_collect_into_at_top_level() {
    let mut builder = PlanBuilder::new();
    let a = builder.var("a");
    let key = builder.var("key");
    let groups = builder.var("groups");
    builder.then(NodeData::Singleton);
    builder.then(calculation(a, Expression::literal(1)));
    let collect = builder.then(NodeData::Collect(CollectNode::grouping(
        vec![GroupVarInfo {
            out_variable: key,
            in_variable: a,
        }],
        Some(groups),
    )));
    let plan = builder.finish();

    assert_eq!(plan.variables_used_here(collect).unwrap(), set(&[a]));
}

#[test]
fn test_random_plans_only_use_valid_variables() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..20 {
        let len = rng.usize(1..12);
        let mut plan = random_linear_plan(&mut rng, len);
        plan.find_var_usage().unwrap();
        for id in chain(&plan) {
            let node = plan.node(id).unwrap();
            let valid = node.vars_valid().unwrap().last().unwrap();
            for var in plan.variables_used_here(id).unwrap() {
                assert!(valid.contains(&var), "{} read at {} before it is set", var, id);
            }
        }
    }
}

#[test]
fn test_spliced_subquery_frames() {
    let (mut plan, vars) = spliced_subquery_plan();
    plan.find_var_usage().unwrap();

    // nodes inside the spliced subquery see one frame per nesting level
    let calc = plan.node(vars.calc).unwrap();
    assert_eq!(
        calc.vars_used_later().unwrap(),
        &vec![set(&[vars.s]), set(&[vars.s, vars.x])]
    );
    assert_eq!(
        calc.vars_valid().unwrap(),
        &vec![set(&[vars.o]), set(&[vars.o, vars.u, vars.x])]
    );
    for id in [vars.start, vars.inner_enum] {
        let node = plan.node(id).unwrap();
        assert_eq!(node.vars_used_later().unwrap().len(), 2);
        assert_eq!(node.vars_valid().unwrap().len(), 2);
    }

    // the inner frame is merged back into the outer one at SubqueryStart
    let outer_enum = plan.node(vars.outer_enum).unwrap();
    assert_eq!(outer_enum.vars_used_later().unwrap().len(), 1);
    assert!(outer_enum.vars_used_later().unwrap()[0].contains(&vars.o));
    assert_eq!(outer_enum.vars_valid().unwrap(), &vec![set(&[vars.o])]);

    // SubqueryEnd closes the inner frame
    let end = plan.node(vars.end).unwrap();
    assert_eq!(end.vars_valid().unwrap(), &vec![set(&[vars.o, vars.s])]);
    assert_eq!(plan.get_var_set_by(vars.x), Some(vars.calc));
    assert_eq!(plan.get_var_set_by(vars.s), Some(vars.end));
}
