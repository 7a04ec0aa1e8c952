// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::rc::Rc;

use txtree::dependency::Dependency;
use txtree::expression::{Array, Expression, ExprRef};
use txtree::program::{
    BinaryOp, CallHistory, CastKind, InstrId, Instruction, Opcode, TargetData, ValueId,
};
use txtree::shadow_array::ShadowArrays;

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

fn tracker() -> Rc<Dependency> {
    Dependency::new(Rc::new(TargetData::default()))
}

fn no_history() -> CallHistory {
    CallHistory::default()
}

#[test]
fn alloca_creates_a_pointer_value() {
    let dep = tracker();
    let alloca = instr(1, Opcode::Alloca { size: 16 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();

    let value = dep.latest_value(ValueId(1)).unwrap();
    assert!(value.is_pointer());
    let locations = value.locations();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].size(), Some(16));
    assert_eq!(locations[0].concrete_offset(), Some(0));
    assert_eq!(locations[0].concrete_bound(), Some(16));
    assert!(locations[0].has_constant_address());
}

#[test]
fn store_then_load_flows_the_stored_value() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();

    let store = instr(2, Opcode::Store, &[10, 1], None);
    dep.execute(&store, &no_history(), &[(k.clone(), None), (const64(0x1000), None)])
        .unwrap();

    let load = instr(3, Opcode::Load, &[1], Some(3));
    dep.execute(&load, &no_history(), &[(k.clone(), None), (const64(0x1000), None)])
        .unwrap();

    let loaded = dep.latest_value(ValueId(3)).unwrap();
    let sources = loaded.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].0.value_id(), ValueId(10));
    assert!(sources[0].1.is_some(), "flow must carry the via-location");
    assert!(loaded.load_address().is_some());
    assert_eq!(
        loaded.load_address().unwrap().value_id(),
        ValueId(1),
        "load address is the alloca value"
    );
}

#[test]
fn load_miss_writes_back_for_consistency() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();

    let first = instr(3, Opcode::Load, &[1], Some(3));
    dep.execute(&first, &no_history(), &[(k.clone(), None), (const64(0x1000), None)])
        .unwrap();
    let second = instr(4, Opcode::Load, &[1], Some(4));
    dep.execute(&second, &no_history(), &[(k.clone(), None), (const64(0x1000), None)])
        .unwrap();

    // The first load missed and wrote its fresh value back; the second load
    // must observe that value.
    let second_value = dep.latest_value(ValueId(4)).unwrap();
    let sources = second_value.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].0.value_id(), ValueId(3));
}

#[test]
fn gep_offsets_the_base_location() {
    let dep = tracker();
    let alloca = instr(1, Opcode::Alloca { size: 16 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();

    let gep = instr(5, Opcode::GetElementPtr, &[1], Some(5));
    dep.execute(
        &gep,
        &no_history(),
        &[
            (const64(0x1004), None),
            (const64(0x1000), None),
            (const64(4), None),
        ],
    )
    .unwrap();

    let derived = dep.latest_value(ValueId(5)).unwrap();
    let locations = derived.locations();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].concrete_offset(), Some(4));
    assert_eq!(locations[0].concrete_bound(), Some(12));
    // Context is inherited from the allocation.
    assert_eq!(locations[0].context().site_id(), InstrId(1));
}

#[test]
fn gep_keeps_an_inconsistent_candidate_when_it_is_the_only_one() {
    let dep = tracker();
    let alloca = instr(1, Opcode::Alloca { size: 16 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();

    // The executor's address does not agree with base + delta; with no other
    // candidate the location is still derived.
    let gep = instr(5, Opcode::GetElementPtr, &[1], Some(5));
    dep.execute(
        &gep,
        &no_history(),
        &[
            (const64(0x9999), None),
            (const64(0x1000), None),
            (const64(4), None),
        ],
    )
    .unwrap();
    assert_eq!(dep.latest_value(ValueId(5)).unwrap().locations().len(), 1);
}

#[test]
fn branch_marks_the_condition_flow_as_core() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let cmp_expr = Expression::ugt(k.clone(), const64(0));

    let cmp = instr(6, Opcode::Binary(BinaryOp::ICmp), &[90, 91], Some(6));
    dep.execute(
        &cmp,
        &no_history(),
        &[(cmp_expr, None), (k.clone(), None), (const64(0), None)],
    )
    .unwrap();
    let condition = dep.latest_value(ValueId(6)).unwrap();
    assert!(!condition.is_core());

    let branch = instr(7, Opcode::Branch { conditional: true }, &[6], None);
    dep.execute(&branch, &no_history(), &[]).unwrap();

    assert!(condition.is_core());
    assert!(!condition.can_interpolate_bound());
    let reasons = condition.reasons();
    assert!(reasons.iter().any(|reason| reason.starts_with("branch")));
}

#[test]
fn core_marking_is_monotonic_and_collects_reasons() {
    let dep = tracker();
    let cast = instr(8, Opcode::Cast(CastKind::ZExt), &[90], Some(8));
    dep.execute(
        &cast,
        &no_history(),
        &[(const64(5), None), (Expression::constant(5, 32), None)],
    )
    .unwrap();

    let value = dep.latest_value(ValueId(8)).unwrap();
    assert!(dep.mark_all_values(ValueId(8), "first reason"));
    assert!(value.is_core());
    assert!(dep.mark_all_values(ValueId(8), "second reason"));
    assert!(value.is_core(), "core marking must never be cleared");
    assert_eq!(value.reasons().len(), 2);
}

#[test]
fn call_binding_rebinds_arguments_and_returns() {
    let dep = tracker();
    let (_, k) = symbolic("k");

    // The caller computes an argument value.
    let produce = instr(20, Opcode::Cast(CastKind::ZExt), &[90], Some(2));
    dep.execute(
        &produce,
        &no_history(),
        &[(const64(5), None), (Expression::constant(5, 32), None)],
    )
    .unwrap();

    let site = instr(
        8,
        Opcode::Call {
            callee: Some(Rc::from("helper")),
            parameters: vec![ValueId(100)],
        },
        &[2],
        Some(8),
    );
    let mut history = no_history();
    dep.bind_call_arguments(&site, &mut history, &[(k.clone(), None)])
        .unwrap();
    assert_eq!(history, vec![InstrId(8)]);

    // The parameter value exists in the callee and flows from the argument.
    let parameter = dep.latest_value(ValueId(100)).unwrap();
    assert_eq!(parameter.sources().len(), 1);
    assert_eq!(parameter.sources()[0].0.value_id(), ValueId(2));
    assert_eq!(parameter.call_history(), &vec![InstrId(8)]);

    // The callee computes its result and returns it.
    let compute = instr(
        101,
        Opcode::Binary(BinaryOp::Add),
        &[100, 100],
        Some(101),
    );
    let sum = Expression::add(k.clone(), k.clone());
    dep.execute(
        &compute,
        &history,
        &[(sum.clone(), None), (k.clone(), None), (k.clone(), None)],
    )
    .unwrap();

    let ret = instr(9, Opcode::Return, &[101], None);
    dep.bind_return_value(&site, &mut history, &ret, Some(sum))
        .unwrap();
    assert!(history.is_empty());

    let result = dep.latest_value(ValueId(8)).unwrap();
    assert_eq!(result.sources().len(), 1);
    assert_eq!(result.sources()[0].0.value_id(), ValueId(101));
}

#[test]
fn callee_allocations_land_in_the_callee_frame() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let site = instr(
        8,
        Opcode::Call {
            callee: Some(Rc::from("helper")),
            parameters: vec![],
        },
        &[],
        Some(8),
    );
    let mut history = no_history();
    dep.bind_call_arguments(&site, &mut history, &[]).unwrap();

    let alloca = Rc::new(Instruction {
        id: InstrId(30),
        opcode: Opcode::Alloca { size: 8 },
        function: Rc::from("helper"),
        line: 30,
        operands: vec![],
        result: Some(ValueId(30)),
    });
    dep.execute(&alloca, &history, &[(const64(0x2000), None)])
        .unwrap();
    let store = Rc::new(Instruction {
        id: InstrId(31),
        opcode: Opcode::Store,
        function: Rc::from("helper"),
        line: 31,
        operands: vec![ValueId(40), ValueId(30)],
        result: None,
    });
    dep.execute(&store, &history, &[(k.clone(), None), (const64(0x2000), None)])
        .unwrap();
    let load = Rc::new(Instruction {
        id: InstrId(32),
        opcode: Opcode::Load,
        function: Rc::from("helper"),
        line: 32,
        operands: vec![ValueId(30)],
        result: Some(ValueId(32)),
    });
    dep.execute(&load, &history, &[(k, None), (const64(0x2000), None)])
        .unwrap();

    // The load observes the value stored through the callee-frame location.
    let loaded = dep.latest_value(ValueId(32)).unwrap();
    assert_eq!(loaded.sources().len(), 1);
    assert_eq!(loaded.sources()[0].0.value_id(), ValueId(40));
}

#[test]
fn recognized_allocator_creates_a_sized_pointer() {
    let dep = tracker();
    let site = instr(
        10,
        Opcode::Call {
            callee: Some(Rc::from("malloc")),
            parameters: vec![],
        },
        &[50],
        Some(10),
    );
    dep.execute(
        &site,
        &no_history(),
        &[(const64(0x2000), None), (const64(32), None)],
    )
    .unwrap();

    let value = dep.latest_value(ValueId(10)).unwrap();
    assert!(value.is_pointer());
    assert_eq!(value.locations()[0].size(), Some(32));
    assert!(!value.locations()[0].is_global());
}

#[test]
fn environment_results_are_global() {
    let dep = tracker();
    let site = instr(
        11,
        Opcode::Call {
            callee: Some(Rc::from("getenv")),
            parameters: vec![],
        },
        &[51],
        Some(11),
    );
    dep.execute(
        &site,
        &no_history(),
        &[(const64(0x3000), None), (const64(0), None)],
    )
    .unwrap();

    let value = dep.latest_value(ValueId(11)).unwrap();
    assert!(value.is_pointer());
    assert_eq!(value.locations()[0].size(), None);
    assert!(value.locations()[0].is_global());
}

#[test]
fn unknown_external_marks_pointer_arguments() {
    let dep = tracker();
    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();
    let pointer = dep.latest_value(ValueId(1)).unwrap();

    let site = instr(
        12,
        Opcode::Call {
            callee: Some(Rc::from("frobnicate")),
            parameters: vec![],
        },
        &[1],
        Some(12),
    );
    dep.execute(
        &site,
        &no_history(),
        &[(const64(0), None), (const64(0x1000), None)],
    )
    .unwrap();

    assert!(pointer.is_core());
    assert!(pointer
        .reasons()
        .contains("parameter of external call"));
    // The default handler still produces a result value, with no flow.
    let result = dep.latest_value(ValueId(12)).unwrap();
    assert!(result.sources().is_empty());
}

#[test]
fn phi_flows_from_the_chosen_incoming_value() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let produce = instr(20, Opcode::Cast(CastKind::ZExt), &[90], Some(20));
    dep.execute(
        &produce,
        &no_history(),
        &[(const64(5), None), (Expression::constant(5, 32), None)],
    )
    .unwrap();

    let phi = instr(
        12,
        Opcode::Phi {
            incoming: vec![ValueId(20), ValueId(21)],
        },
        &[],
        Some(12),
    );
    dep.execute_phi(&phi, 0, &no_history(), &(k, None)).unwrap();

    let value = dep.latest_value(ValueId(12)).unwrap();
    assert_eq!(value.sources().len(), 1);
    assert_eq!(value.sources()[0].0.value_id(), ValueId(20));
}

#[test]
fn passed_bounds_check_marks_pointer_flow_without_disabling_bounds() {
    let dep = tracker();
    let (_, k) = symbolic("k");
    let alloca = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    dep.execute(&alloca, &no_history(), &[(const64(0x1000), None)])
        .unwrap();
    let pointer = dep.latest_value(ValueId(1)).unwrap();

    let load = instr(3, Opcode::Load, &[1], Some(3));
    dep.execute_memory_operation(
        &load,
        &no_history(),
        &[(k, None), (const64(0x1000), None)],
        true,
    )
    .unwrap();

    assert!(pointer.is_core());
    assert!(
        pointer.can_interpolate_bound(),
        "pointer marking must keep bound interpolation available"
    );
    assert!(pointer
        .reasons()
        .iter()
        .any(|reason| reason.starts_with("pointer use")));
    assert!(!dep.core_locations().is_empty());
}

#[test]
fn summary_extraction_filters_to_core_values() {
    let dep = tracker();
    let (karray, k) = symbolic("k");
    let (_, j) = symbolic("j");
    let mut shadows = ShadowArrays::new();
    shadows.register(&karray);

    let alloca_a = instr(1, Opcode::Alloca { size: 8 }, &[], Some(1));
    dep.execute(&alloca_a, &no_history(), &[(const64(0x1000), None)])
        .unwrap();
    let alloca_b = instr(2, Opcode::Alloca { size: 8 }, &[], Some(2));
    dep.execute(&alloca_b, &no_history(), &[(const64(0x2000), None)])
        .unwrap();

    let store_a = instr(3, Opcode::Store, &[10, 1], None);
    dep.execute(&store_a, &no_history(), &[(k, None), (const64(0x1000), None)])
        .unwrap();
    let store_b = instr(4, Opcode::Store, &[11, 2], None);
    dep.execute(&store_b, &no_history(), &[(j, None), (const64(0x2000), None)])
        .unwrap();

    // Only the first stored value joins the core.
    assert!(dep.mark_all_values(ValueId(10), "test core"));

    let mut replacements = Vec::new();
    let (concrete, symbolic_store) =
        dep.get_stored_expressions(&[], &shadows, &mut replacements, true, true);
    assert!(symbolic_store.is_empty());
    assert_eq!(concrete.len(), 1, "only the core value is summarised");
    assert!(concrete.contains_key(&InstrId(1)));
    assert_eq!(replacements.len(), 1, "the stored value was shadowed");

    // Without the core filter both bindings are visible, unshadowed.
    let mut dummy = Vec::new();
    let (full, _) = dep.get_stored_expressions(&[], &shadows, &mut dummy, false, false);
    assert_eq!(full.len(), 2);
    assert!(dummy.is_empty());
}

#[test]
fn call_depth_is_bounded() {
    let dep = tracker();
    let site = instr(
        8,
        Opcode::Call {
            callee: Some(Rc::from("helper")),
            parameters: vec![],
        },
        &[],
        Some(8),
    );
    let mut history: CallHistory = (0..txtree::k_limits::MAX_CALL_DEPTH as u64)
        .map(InstrId)
        .collect();
    let err = dep.bind_call_arguments(&site, &mut history, &[]);
    assert!(err.is_err());
    assert_eq!(err.unwrap_err().to_string(), "call depth limit exceeded");
    assert_eq!(history.len(), txtree::k_limits::MAX_CALL_DEPTH);
}

#[test]
fn unhandled_arity_is_an_error() {
    let dep = tracker();
    let bad = instr(40, Opcode::Binary(BinaryOp::Add), &[90, 91], Some(40));
    let err = dep.execute(&bad, &no_history(), &[(const64(0), None)]);
    assert!(err.is_err());
    assert_eq!(
        err.unwrap_err().to_string(),
        "unhandled instruction arguments number"
    );
}
