// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::rc::Rc;

use txtree::expression::{Array, Expression, ExprRef};
use txtree::itree::ITree;
use txtree::options::InterpolationOptions;
use txtree::program::{
    CallHistory, ExecutionState, InstrId, Instruction, Opcode, ProgramPoint, TargetData, ValueId,
};
use txtree::smt_solver::{SmtSolver, Validity};

/// A solver double that answers from a script, records the calls it saw, and
/// hands out a fixed unsat core.
#[derive(Debug)]
struct ScriptedSolver {
    result: Validity,
    unsat_core: Vec<ExprRef>,
    evaluate_calls: u32,
    direct_calls: u32,
    timeouts: Vec<f64>,
}

impl ScriptedSolver {
    fn answering(result: Validity) -> ScriptedSolver {
        ScriptedSolver {
            result,
            unsat_core: Vec::new(),
            evaluate_calls: 0,
            direct_calls: 0,
            timeouts: Vec::new(),
        }
    }

    fn valid_with_core(unsat_core: Vec<ExprRef>) -> ScriptedSolver {
        ScriptedSolver {
            result: Validity::Valid,
            unsat_core,
            evaluate_calls: 0,
            direct_calls: 0,
            timeouts: Vec::new(),
        }
    }
}

impl SmtSolver for ScriptedSolver {
    fn evaluate(&mut self, _constraints: &[ExprRef], _query: &ExprRef) -> Validity {
        self.evaluate_calls += 1;
        self.result
    }

    fn direct_compute_validity(&mut self, _constraints: &[ExprRef], _query: &ExprRef) -> Validity {
        self.direct_calls += 1;
        self.result
    }

    fn get_unsat_core(&self) -> Vec<ExprRef> {
        self.unsat_core.clone()
    }

    fn set_timeout(&mut self, seconds: f64) {
        self.timeouts.push(seconds);
    }
}

fn instr(id: u64, opcode: Opcode, operands: &[u64], result: Option<u64>) -> Rc<Instruction> {
    Rc::new(Instruction {
        id: InstrId(id),
        opcode,
        function: Rc::from("main"),
        line: id as u32,
        operands: operands.iter().copied().map(ValueId).collect(),
        result: result.map(ValueId),
    })
}

fn const64(value: u64) -> ExprRef {
    Expression::constant(value, 64)
}

fn symbolic(name: &str) -> (Rc<Array>, ExprRef) {
    let array = Array::new(name, 32, 64);
    let read = Expression::read(array.clone(), Expression::constant(0, 32));
    (array, read)
}

fn state(program_point: u64, constraints: Vec<ExprRef>) -> ExecutionState {
    ExecutionState {
        pc: ProgramPoint {
            instruction: InstrId(program_point),
            basic_block: program_point,
            function: Rc::from("main"),
            line: program_point as u32,
        },
        call_history: CallHistory::default(),
        constraints,
    }
}

fn new_tree() -> ITree {
    ITree::new(InterpolationOptions::default(), TargetData::default())
}

#[test]
fn identical_state_is_subsumed() {
    let mut tree = new_tree();
    let (x_array, x) = symbolic("x");
    tree.register_symbolic_array(&x_array);
    let constraint = Expression::ugt(x, const64(0));

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(10, vec![]));
    let (left, right) = tree.split(&root);

    // Left path: reach program point 42, record the branch constraint, and
    // learn from an infeasible branch that it belongs to the interpolant.
    tree.set_current_node(&left, &state(42, vec![constraint.clone()]));
    tree.add_constraint(constraint.clone(), None);
    assert_eq!(left.path_condition_len(), 1);
    let mut solver = ScriptedSolver::valid_with_core(vec![constraint.clone()]);
    tree.mark_path_condition(&solver, None);
    tree.remove(&left);
    assert_eq!(tree.table_entries(42).len(), 1);
    assert!(tree.table_entries(42)[0].interpolant().is_some());

    // Right path arrives at the same program point with the same constraint.
    tree.set_current_node(&right, &state(42, vec![constraint.clone()]));
    tree.add_constraint(constraint.clone(), None);
    let subsumed = tree.check_current_state_subsumption(
        &mut solver,
        &state(42, vec![constraint]),
        10.0,
    );

    assert!(subsumed);
    assert!(right.is_subsumed());
    assert_eq!(tree.check_solver_count(), 1);
    assert_eq!(tree.check_solver_failure_count(), 0);
    // The interpolant is existentially quantified over the shadow array, so
    // the query went down the fresh-context solver path.
    assert_eq!(solver.direct_calls, 1);
    assert_eq!(solver.evaluate_calls, 0);
}

#[test]
fn empty_entry_subsumes_without_a_solver_call() {
    let mut tree = new_tree();
    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);

    tree.set_current_node(&left, &state(7, vec![]));
    tree.remove(&left);

    tree.set_current_node(&right, &state(7, vec![]));
    let mut solver = ScriptedSolver::answering(Validity::Unknown);
    assert!(tree.check_current_state_subsumption(&mut solver, &state(7, vec![]), 10.0));
    assert_eq!(tree.check_solver_count(), 0);
    assert_eq!(solver.evaluate_calls + solver.direct_calls, 0);
}

#[test]
fn missing_program_point_fails_without_a_solver_call() {
    let mut tree = new_tree();
    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);
    tree.set_current_node(&left, &state(7, vec![]));
    tree.remove(&left);

    // The right node sits at a different program point; no entry matches.
    tree.set_current_node(&right, &state(9, vec![]));
    let mut solver = ScriptedSolver::answering(Validity::Valid);
    assert!(!tree.check_current_state_subsumption(&mut solver, &state(9, vec![]), 10.0));
    // A state whose program counter disagrees with the node fails fast.
    assert!(!tree.check_current_state_subsumption(&mut solver, &state(8, vec![]), 10.0));
    assert_eq!(tree.check_solver_count(), 0);
}

#[test]
fn store_value_mismatch_is_not_subsumed() {
    let mut tree = new_tree();
    let (k_array, k) = symbolic("k");
    tree.register_symbolic_array(&k_array);

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let history = CallHistory::default();

    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    tree.execute(&alloca, &history, &[(const64(0x1000), None)])
        .unwrap();
    let store = instr(2, Opcode::Store, &[10, 1], None);
    let k_plus_1 = Expression::add(k.clone(), const64(1));
    tree.execute(
        &store,
        &history,
        &[(k_plus_1, None), (const64(0x1000), None)],
    )
    .unwrap();
    // The stored value participated in the unsatisfiability core.
    assert!(root.dependency().mark_all_values(ValueId(10), "needed by core"));

    let (left, right) = tree.split(&root);
    tree.set_current_node(&left, &state(7, vec![]));
    tree.remove(&left);
    assert_eq!(tree.table_entries(7).len(), 1);

    // The right path overwrites the location with k+2 before reaching the
    // same program point.
    tree.set_current_node(&right, &state(3, vec![]));
    let store2 = instr(4, Opcode::Store, &[11, 1], None);
    let k_plus_2 = Expression::add(k, const64(2));
    tree.execute(
        &store2,
        &history,
        &[(k_plus_2, None), (const64(0x1000), None)],
    )
    .unwrap();
    let (grandchild, _) = tree.split(&right);
    tree.set_current_node(&grandchild, &state(7, vec![]));

    let mut solver = ScriptedSolver::answering(Validity::Invalid);
    let subsumed =
        tree.check_current_state_subsumption(&mut solver, &state(7, vec![]), 10.0);

    assert!(!subsumed);
    assert!(!grandchild.is_subsumed());
    assert_eq!(tree.check_solver_count(), 1);
    assert_eq!(tree.check_solver_failure_count(), 1);
    // The existential simplifier reduced the query to an unquantified
    // equality, so the standard solver path was used.
    assert_eq!(solver.evaluate_calls, 1);
    assert_eq!(solver.direct_calls, 0);
}

#[test]
fn in_bounds_pointer_store_short_circuits_the_bounds_check() {
    let mut tree = new_tree();
    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let history = CallHistory::default();

    // beta holds a pointer into alpha.
    let alloca_beta = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    tree.execute(&alloca_beta, &history, &[(const64(0x1000), None)])
        .unwrap();
    let alloca_alpha = instr(2, Opcode::Alloca { size: 8 }, &[], Some(2));
    tree.execute(&alloca_alpha, &history, &[(const64(0x2000), None)])
        .unwrap();
    let store = instr(3, Opcode::Store, &[2, 1], None);
    tree.execute(
        &store,
        &history,
        &[(const64(0x2000), None), (const64(0x1000), None)],
    )
    .unwrap();
    let alpha_pointer = root.dependency().latest_value(ValueId(2)).unwrap();
    root.dependency()
        .mark_all_pointer_values(&alpha_pointer, "pointer use [main: Line 3]");
    assert!(alpha_pointer.can_interpolate_bound());

    let (left, right) = tree.split(&root);
    tree.set_current_node(&left, &state(13, vec![]));
    tree.remove(&left);

    // The right path stores a strictly interior pointer at the same slot.
    tree.set_current_node(&right, &state(4, vec![]));
    let gep = instr(5, Opcode::GetElementPtr, &[2], Some(5));
    tree.execute(
        &gep,
        &history,
        &[
            (const64(0x2004), None),
            (const64(0x2000), None),
            (const64(4), None),
        ],
    )
    .unwrap();
    let store2 = instr(6, Opcode::Store, &[5, 1], None);
    tree.execute(
        &store2,
        &history,
        &[(const64(0x2004), None), (const64(0x1000), None)],
    )
    .unwrap();
    let (grandchild, _) = tree.split(&right);
    tree.set_current_node(&grandchild, &state(13, vec![]));

    // The entry's recorded bound is 8, the state's offset is 4: the bounds
    // check folds to true and nothing is left to ask the solver.
    let mut solver = ScriptedSolver::answering(Validity::Invalid);
    let subsumed =
        tree.check_current_state_subsumption(&mut solver, &state(13, vec![]), 10.0);

    assert!(subsumed);
    assert_eq!(tree.check_solver_count(), 0);
    assert_eq!(solver.evaluate_calls + solver.direct_calls, 0);
}

#[test]
fn unsat_core_marks_exactly_the_named_constraints() {
    let mut tree = new_tree();
    let (_, x) = symbolic("x");
    let constraints: Vec<ExprRef> = (1..=4)
        .map(|bound| Expression::ult(x.clone(), const64(bound)))
        .collect();

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    for constraint in &constraints {
        tree.add_constraint(constraint.clone(), None);
    }
    assert_eq!(root.path_condition_len(), 4);

    let solver =
        ScriptedSolver::valid_with_core(vec![constraints[0].clone(), constraints[2].clone()]);
    tree.mark_path_condition(&solver, None);

    // Walk the list (newest first) and collect the marks.
    let mut marked = Vec::new();
    let mut cell = root.path_condition();
    while let Some(pc) = cell {
        marked.push((pc.car().clone(), pc.car_in_interpolant()));
        cell = pc.cdr().cloned();
    }
    marked.reverse();
    assert_eq!(marked.len(), 4);
    assert!(marked[0].1, "c1 is in the unsat core");
    assert!(!marked[1].1, "c2 is not");
    assert!(marked[2].1, "c3 is in the unsat core");
    assert!(!marked[3].1, "c4 is not");
}

#[test]
fn solver_timeout_counts_as_a_failure() {
    let mut tree = new_tree();
    let (x_array, x) = symbolic("x");
    tree.register_symbolic_array(&x_array);
    let constraint = Expression::ugt(x, const64(0));

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);
    tree.set_current_node(&left, &state(42, vec![]));
    tree.add_constraint(constraint.clone(), None);
    let marker = ScriptedSolver::valid_with_core(vec![constraint.clone()]);
    tree.mark_path_condition(&marker, None);
    tree.remove(&left);

    tree.set_current_node(&right, &state(42, vec![]));
    tree.add_constraint(constraint.clone(), None);
    let mut solver = ScriptedSolver::answering(Validity::Unknown);
    let subsumed =
        tree.check_current_state_subsumption(&mut solver, &state(42, vec![constraint]), 0.5);

    assert!(!subsumed);
    assert_eq!(tree.check_solver_count(), 1);
    assert_eq!(tree.check_solver_failure_count(), 1);
    // The timeout was set for the call and cleared afterwards.
    assert_eq!(solver.timeouts, vec![0.5, 0.0]);
}

#[test]
fn removing_both_children_cascades_to_the_parent() {
    let mut tree = new_tree();
    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);

    tree.set_current_node(&left, &state(5, vec![]));
    tree.remove(&left);
    assert!(root.left().is_none());
    assert!(root.right().is_some());

    tree.set_current_node(&right, &state(6, vec![]));
    tree.remove(&right);
    assert!(root.left().is_none());
    assert!(root.right().is_none());

    // Every removed node left a table entry behind, the root included.
    assert_eq!(tree.table_entries(5).len(), 1);
    assert_eq!(tree.table_entries(6).len(), 1);
    assert_eq!(tree.table_entries(1).len(), 1);
}

#[test]
fn wp_update_drops_regrounded_store_entries_and_existentials() {
    let mut tree = new_tree();
    let (k_array, k) = symbolic("k");
    tree.register_symbolic_array(&k_array);

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let history = CallHistory::default();
    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    tree.execute(&alloca, &history, &[(const64(0x1000), None)])
        .unwrap();
    let store = instr(2, Opcode::Store, &[10, 1], None);
    tree.execute(
        &store,
        &history,
        &[(Expression::add(k.clone(), const64(1)), None), (const64(0x1000), None)],
    )
    .unwrap();
    assert!(root.dependency().mark_all_values(ValueId(10), "needed by core"));

    let (left, _right) = tree.split(&root);
    tree.set_current_node(&left, &state(7, vec![]));
    tree.remove(&left);
    assert!(!tree.table_entries(7)[0].existentials().is_empty());
    assert!(!tree.table_entries(7)[0]
        .concretely_addressed_store()
        .is_empty());

    // A weakest precondition over k re-grounds the stored value; the shadow
    // existential and the store entry become redundant.
    let wp = Expression::ugt(k, const64(0));
    tree.update_subsumption_table_entry(7, wp).unwrap();

    let entry = &tree.table_entries(7)[0];
    assert!(entry.wp_interpolant().is_some());
    assert!(entry.existentials().is_empty());
    assert!(entry.concretely_addressed_store().is_empty());
}

#[test]
fn saved_tree_renders_records_ports_and_subsumption_edges() {
    let mut options = InterpolationOptions::default();
    options.output_tree = true;
    let mut tree = ITree::new(options, TargetData::default());
    let (_, x) = symbolic("x");

    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);

    tree.set_current_node(&left, &state(42, vec![]));
    tree.add_constraint(Expression::ult(x.clone(), const64(10)), None);
    tree.remove(&left);

    tree.set_current_node(&right, &state(42, vec![]));
    let mut solver = ScriptedSolver::answering(Validity::Unknown);
    assert!(tree.check_current_state_subsumption(&mut solver, &state(42, vec![]), 10.0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("search_tree.dot");
    tree.save_graph(&path).unwrap();
    let rendered = std::fs::read_to_string(&path).unwrap();

    assert!(rendered.starts_with("digraph search_tree {"));
    assert!(rendered.contains("shape=record"));
    assert!(rendered.contains("<s0>F|<s1>T"));
    assert!(rendered.contains("style=dashed"), "subsumption edge is dashed");
    assert!(rendered.contains("\\<"), "comparison operators are escaped");
}

#[test]
fn options_parse_from_an_argument_string() {
    let mut options = InterpolationOptions::default();
    let rest =
        options.parse_from_str("--output_tree --time_stat --subsumption_timeout 2.5 -- run.bc");
    assert!(options.interpolation);
    assert!(options.output_tree);
    assert!(options.time_stat);
    assert!(!options.no_existential);
    assert!((options.subsumption_timeout - 2.5).abs() < f64::EPSILON);
    assert_eq!(rest, vec!["run.bc".to_string()]);

    let mut disabled = InterpolationOptions::default();
    disabled.parse_from_str("--no_interpolation");
    assert!(!disabled.interpolation);
}

#[test]
fn disabled_interpolation_never_subsumes_or_tables() {
    let mut options = InterpolationOptions::default();
    options.interpolation = false;
    let mut tree = ITree::new(options, TargetData::default());
    let root = tree.root().clone();
    tree.set_current_node(&root, &state(1, vec![]));
    let (left, right) = tree.split(&root);
    tree.set_current_node(&left, &state(7, vec![]));
    tree.remove(&left);
    assert!(tree.table_entries(7).is_empty());

    tree.set_current_node(&right, &state(7, vec![]));
    let mut solver = ScriptedSolver::answering(Validity::Valid);
    assert!(!tree.check_current_state_subsumption(&mut solver, &state(7, vec![]), 10.0));
}
