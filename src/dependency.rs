// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//
// The flow-dependency analysis that computes the memory locations upon which
// an unsatisfiability core depends. Constraints on the path condition only
// ever mention initial symbolic values; the mappings recorded here relate
// those constraints to the state at an arbitrary execution point, so that
// when a constraint lands in a core we know which slice of the state must be
// part of the summary.

use crate::expression::{Array, ExprRef, Expression};
use crate::k_limits;
use crate::known_names::{KnownNames, KnownNamesCache};
use crate::memory_location::{AllocationContext, MemoryLocation, StoredAddress};
use crate::program::{CallHistory, CastKind, InstrId, Instruction, Opcode, TargetData, ValueId};
use crate::shadow_array::ShadowArrays;
use crate::store_frame::StoreFrame;
use crate::versioned_value::{StoredValue, VersionedValue};

use log::warn;
use log_derive::{logfn, logfn_inputs};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;
use thiserror::Error;

/// One argument of an instruction transfer: the symbolic expression the
/// executor computed, optionally paired with the versioned value it already
/// resolved. When the value is absent the tracker resolves the matching SSA
/// operand itself.
pub type Operand = (ExprRef, Option<Rc<VersionedValue>>);

/// The store part of a summary that is concretely addressed, keyed by
/// allocation site and then by address.
pub type ConcreteStore = BTreeMap<InstrId, BTreeMap<StoredAddress, Rc<StoredValue>>>;

/// The store part of a summary that is symbolically addressed. Kept as pairs
/// because symbolic addresses have no useful lookup order.
pub type SymbolicStore = BTreeMap<InstrId, Vec<(StoredAddress, Rc<StoredValue>)>>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The executor sent an opcode with an argument list of unexpected arity.
    #[error("unhandled instruction arguments number")]
    UnhandledArgumentCount,
    /// A non-constant operand had no recorded value anywhere on the chain.
    #[error("operand not found: {0}")]
    OperandNotFound(ValueId),
    /// The tracked call history reached `k_limits::MAX_CALL_DEPTH`.
    #[error("call depth limit exceeded")]
    CallDepthExceeded,
}

/// Per-node shadow state: the abstract store and the flow graph among
/// versioned values. Each tree node owns a `Dependency` whose parent pointer
/// chains back to the root; values are looked up locally first and then along
/// the chain, while store frames are inherited by persistent-map cloning at
/// node creation.
pub struct Dependency {
    parent: Option<Rc<Dependency>>,
    target_data: Rc<TargetData>,
    /// Shared id source for versioned values and allocation instances,
    /// inherited from the parent so ids are unique per run.
    counter: Rc<Cell<u64>>,
    known_names: Rc<RefCell<KnownNamesCache>>,
    /// Argument values snapshotted by `bind_call_arguments`, waiting to be
    /// rebound to the callee's parameters.
    argument_values: RefCell<Vec<Rc<VersionedValue>>>,
    global_frame: RefCell<StoreFrame>,
    stack: RefCell<Vec<StoreFrame>>,
    values_map: RefCell<HashMap<ValueId, Vec<Rc<VersionedValue>>>>,
    /// Locations reached by pointer-flow marking; the allocations the core
    /// depends on.
    core_locations: RefCell<BTreeSet<Rc<MemoryLocation>>>,
}

impl Dependency {
    /// The root tracker of a fresh tree.
    pub fn new(target_data: Rc<TargetData>) -> Rc<Dependency> {
        Rc::new(Dependency {
            parent: None,
            target_data,
            counter: Rc::new(Cell::new(0)),
            known_names: Rc::new(RefCell::new(KnownNamesCache::new())),
            argument_values: RefCell::new(Vec::new()),
            global_frame: RefCell::new(StoreFrame::new(None, 0)),
            stack: RefCell::new(vec![StoreFrame::new(None, 0)]),
            values_map: RefCell::new(HashMap::new()),
            core_locations: RefCell::new(BTreeSet::new()),
        })
    }

    /// A child tracker inheriting the parent's store by copy-on-write and
    /// chaining value lookups to it.
    pub fn new_child(parent: &Rc<Dependency>) -> Rc<Dependency> {
        Rc::new(Dependency {
            parent: Some(parent.clone()),
            target_data: parent.target_data.clone(),
            counter: parent.counter.clone(),
            known_names: parent.known_names.clone(),
            argument_values: RefCell::new(parent.argument_values.borrow().clone()),
            global_frame: RefCell::new(parent.global_frame.borrow().clone()),
            stack: RefCell::new(parent.stack.borrow().clone()),
            values_map: RefCell::new(HashMap::new()),
            core_locations: RefCell::new(BTreeSet::new()),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Dependency>> {
        self.parent.as_ref()
    }

    pub fn target_data(&self) -> &Rc<TargetData> {
        &self.target_data
    }

    fn next_id(&self) -> u64 {
        let id = self.counter.get();
        self.counter.set(id + 1);
        id
    }

    /// Registers a freshly created versioned value as the newest version of
    /// its value id.
    fn register(&self, value: Rc<VersionedValue>) -> Rc<VersionedValue> {
        self.values_map
            .borrow_mut()
            .entry(value.value_id())
            .or_default()
            .push(value.clone());
        value
    }

    fn new_value(
        &self,
        value_id: ValueId,
        call_history: &CallHistory,
        expr: ExprRef,
    ) -> Rc<VersionedValue> {
        self.register(VersionedValue::create(
            self.next_id(),
            value_id,
            call_history.clone(),
            expr,
        ))
    }

    /// A fresh pointer value whose location starts a new allocation at the
    /// given site.
    fn new_pointer_value(
        &self,
        site: &Rc<Instruction>,
        value_id: ValueId,
        call_history: &CallHistory,
        address: ExprRef,
        size: Option<u64>,
        global: bool,
    ) -> Rc<VersionedValue> {
        let context = if global {
            AllocationContext::new_global(site.clone(), self.next_id())
        } else {
            AllocationContext::new(site.clone(), call_history.clone(), self.next_id())
        };
        let value = VersionedValue::create(self.next_id(), value_id, call_history.clone(), address);
        value.add_location(MemoryLocation::create(context, value.expression().clone(), size));
        self.register(value)
    }

    /// The newest version of the given value id, here or on the ancestor
    /// chain.
    #[logfn_inputs(TRACE)]
    #[logfn(TRACE)]
    pub fn latest_value(&self, value_id: ValueId) -> Option<Rc<VersionedValue>> {
        if let Some(versions) = self.values_map.borrow().get(&value_id) {
            if let Some(last) = versions.last() {
                return Some(last.clone());
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.latest_value(value_id))
    }

    /// Resolves an operand: a value the executor already attached wins,
    /// otherwise the newest version of the operand's value id.
    fn resolve(&self, operand: &Operand, value_id: ValueId) -> Option<Rc<VersionedValue>> {
        operand
            .1
            .clone()
            .or_else(|| self.latest_value(value_id))
    }

    /// Resolves an address operand, synthesising an unknown-size location at
    /// `instr` when the executor passed an address that was never allocated,
    /// so that execution can continue.
    fn resolve_address(
        &self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        operand: &Operand,
        value_id: ValueId,
    ) -> Rc<VersionedValue> {
        let value = match self.resolve(operand, value_id) {
            Some(value) => value,
            None => self.new_value(value_id, call_history, operand.0.clone()),
        };
        if !value.is_pointer() {
            let context = AllocationContext::new(instr.clone(), call_history.clone(), self.next_id());
            value.add_location(MemoryLocation::create(context, operand.0.clone(), None));
        }
        value
    }

    /// Copies flow and pointer targets from `source` into `target`.
    fn add_flow(&self, source: &Rc<VersionedValue>, target: &Rc<VersionedValue>) {
        target.add_dependency(source.clone(), None);
        for loc in source.locations() {
            target.add_location(loc);
        }
    }

    /// Flow without pointer propagation, for results that are known not to be
    /// pointers (pointer-to-integer casts, arithmetic).
    fn add_flow_to_non_pointer(&self, source: &Rc<VersionedValue>, target: &Rc<VersionedValue>) {
        target.add_dependency(source.clone(), None);
    }

    /// Flow through a memory location, as created by load and store.
    fn add_flow_via(
        &self,
        source: &Rc<VersionedValue>,
        target: &Rc<VersionedValue>,
        via: Rc<MemoryLocation>,
    ) {
        target.add_dependency(source.clone(), Some(via));
        for loc in source.locations() {
            target.add_location(loc);
        }
    }

    // --- store frames ---------------------------------------------------

    /// Runs `f` on the frame owning `loc`: the global frame for global
    /// locations, otherwise the stack frame whose height and callsite match
    /// the location's call history.
    fn with_frame<T>(
        &self,
        loc: &Rc<MemoryLocation>,
        f: impl FnOnce(&mut StoreFrame) -> T,
    ) -> Option<T> {
        if loc.is_global() {
            return Some(f(&mut self.global_frame.borrow_mut()));
        }
        let mut stack = self.stack.borrow_mut();
        let history = loc.context().call_history();
        let index = history.len();
        let frame = stack.get_mut(index)?;
        let matches = match frame.callsite() {
            None => history.is_empty(),
            Some(callsite) => history.last() == Some(&callsite),
        };
        if matches {
            Some(f(frame))
        } else {
            None
        }
    }

    fn update_store(
        &self,
        loc: Rc<MemoryLocation>,
        address: Rc<VersionedValue>,
        value: Rc<VersionedValue>,
    ) {
        let updated = self.with_frame(&loc, |frame| {
            frame.update_store(loc.clone(), address.clone(), value.clone())
        });
        if updated.is_none() {
            // No frame matches the allocation's call history; treat the
            // location as global so the write is not lost.
            self.global_frame
                .borrow_mut()
                .update_store(loc, address, value);
        }
    }

    fn read_store(&self, loc: &Rc<MemoryLocation>) -> Option<(Rc<VersionedValue>, Rc<VersionedValue>)> {
        match self.with_frame(loc, |frame| frame.read(loc)) {
            Some(hit) => hit,
            None => self.global_frame.borrow().read(loc),
        }
    }

    // --- instruction transfer -------------------------------------------

    /// Abstract dependency state transition for one instruction. `args` is
    /// the ordered list of operand expressions with the result expression at
    /// index 0 where the instruction produces a value.
    #[logfn_inputs(TRACE)]
    pub fn execute(
        &self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        args: &[Operand],
    ) -> Result<(), TransferError> {
        match &instr.opcode {
            Opcode::Branch { conditional } => {
                if *conditional {
                    let condition = instr
                        .operands
                        .first()
                        .and_then(|id| self.latest_value(*id));
                    if let Some(condition) = condition {
                        self.mark_flow(
                            &condition,
                            &format!("branch {}", instr.location_tag()),
                        );
                    }
                }
                Ok(())
            }
            Opcode::Alloca { size } => {
                let (address, _) = args.first().ok_or(TransferError::UnhandledArgumentCount)?;
                let result = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                self.new_pointer_value(instr, result, call_history, address.clone(), Some(*size), false);
                Ok(())
            }
            Opcode::Load => {
                if args.len() != 2 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let address_value =
                    self.resolve_address(instr, call_history, &args[1], instr.operands[0]);
                let loaded = self.new_value(result_id, call_history, args[0].0.clone());
                loaded.set_load_address(address_value.clone());
                for loc in address_value.locations() {
                    match self.read_store(&loc) {
                        Some((_, stored)) => {
                            self.add_flow_via(&stored, &loaded, loc);
                        }
                        None => {
                            // First read through this location: write the
                            // fresh value back so subsequent loads agree.
                            self.update_store(loc, address_value.clone(), loaded.clone());
                        }
                    }
                }
                Ok(())
            }
            Opcode::Store => {
                if args.len() != 2 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let stored = match self.resolve(&args[0], instr.operands[0]) {
                    Some(value) => value,
                    None => self.new_value(instr.operands[0], call_history, args[0].0.clone()),
                };
                let address_value =
                    self.resolve_address(instr, call_history, &args[1], instr.operands[1]);
                stored.set_store_address(address_value.clone());
                for loc in address_value.locations() {
                    self.update_store(loc, address_value.clone(), stored.clone());
                }
                Ok(())
            }
            Opcode::GetElementPtr => {
                if args.len() != 3 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let address = &args[0].0;
                let delta = &args[2].0;
                let base_value =
                    self.resolve_address(instr, call_history, &args[1], instr.operands[0]);
                let result = self.new_value(result_id, call_history, address.clone());
                self.add_flow_to_non_pointer(&base_value, &result);
                let candidates = base_value.locations();
                let consistent: Vec<_> = candidates
                    .iter()
                    .filter(|parent| MemoryLocation::offset_consistent(parent, address, delta))
                    .cloned()
                    .collect();
                // An inconsistent candidate is only skipped when another
                // candidate survives the concrete-arithmetic check.
                let chosen = if consistent.is_empty() { candidates } else { consistent };
                for parent in chosen {
                    result.add_location(MemoryLocation::create_with_offset(&parent, delta.clone()));
                }
                Ok(())
            }
            Opcode::Cast(kind) => {
                if args.len() != 2 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let operand = self.resolve(&args[1], instr.operands[0]);
                match kind {
                    CastKind::IntToPtr => {
                        let result = self.new_pointer_value(
                            instr,
                            result_id,
                            call_history,
                            args[0].0.clone(),
                            None,
                            false,
                        );
                        if let Some(operand) = operand {
                            self.add_flow_to_non_pointer(&operand, &result);
                        }
                    }
                    CastKind::PtrToInt => {
                        let result = self.new_value(result_id, call_history, args[0].0.clone());
                        match operand {
                            Some(operand) => self.add_flow_to_non_pointer(&operand, &result),
                            None => return Err(TransferError::OperandNotFound(instr.operands[0])),
                        }
                    }
                    _ => {
                        let result = self.new_value(result_id, call_history, args[0].0.clone());
                        if let Some(operand) = operand {
                            self.add_flow(&operand, &result);
                        } else if !args[1].0.is_constant() {
                            // Constants kill dependencies; anything else
                            // should have been seen before.
                            return Err(TransferError::OperandNotFound(instr.operands[0]));
                        }
                    }
                }
                Ok(())
            }
            Opcode::ExtractValue => {
                if args.len() != 2 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let result = self.new_value(result_id, call_history, args[0].0.clone());
                if let Some(operand) = self.resolve(&args[1], instr.operands[0]) {
                    self.add_flow(&operand, &result);
                }
                Ok(())
            }
            Opcode::Binary(_) => {
                if args.len() != 3 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let op1 = self.resolve(&args[1], instr.operands[0]);
                let op2 = self.resolve(&args[2], instr.operands[1]);
                let result = self.new_value(result_id, call_history, args[0].0.clone());
                if let Some(op1) = op1 {
                    self.add_flow_to_non_pointer(&op1, &result);
                }
                if let Some(op2) = op2 {
                    self.add_flow_to_non_pointer(&op2, &result);
                }
                Ok(())
            }
            Opcode::Select => {
                if args.len() != 3 {
                    return Err(TransferError::UnhandledArgumentCount);
                }
                let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
                let true_value = self.resolve(&args[1], instr.operands[1]);
                let false_value = self.resolve(&args[2], instr.operands[2]);
                let result = self.new_value(result_id, call_history, args[0].0.clone());
                if let Some(value) = true_value {
                    self.add_flow(&value, &result);
                }
                if let Some(value) = false_value {
                    self.add_flow(&value, &result);
                }
                Ok(())
            }
            Opcode::Call { callee, .. } => {
                self.execute_external_call(instr, call_history, callee, args)
            }
            Opcode::Return => Ok(()),
            Opcode::Phi { .. } => Err(TransferError::UnhandledArgumentCount),
        }
    }

    /// Transfer for a call whose body is not tracked. Recognised names get
    /// result shapes from the name table; everything else degrades to the
    /// default handler with a warning.
    fn execute_external_call(
        &self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        callee: &Option<Rc<str>>,
        args: &[Operand],
    ) -> Result<(), TransferError> {
        let name = match callee {
            Some(name) => name.clone(),
            None => Rc::from("<indirect>"),
        };
        let known = self.known_names.borrow_mut().get(&name);
        let result_id = instr.result;
        match known {
            _ if known.returns_pointer() => {
                let result_id = result_id.ok_or(TransferError::UnhandledArgumentCount)?;
                let result_expr = args
                    .first()
                    .ok_or(TransferError::UnhandledArgumentCount)?
                    .0
                    .clone();
                let size = self.external_allocation_size(known, args);
                self.new_pointer_value(
                    instr,
                    result_id,
                    call_history,
                    result_expr,
                    size,
                    known.returns_environment_pointer(),
                );
                Ok(())
            }
            KnownNames::None => {
                warn!("using default handler for external function {}", name);
                for (index, operand_id) in instr.operands.iter().enumerate() {
                    let operand = args.get(index + 1).cloned().unwrap_or_else(|| {
                        (Expression::bool_true(), None)
                    });
                    if let Some(value) = self.resolve(&operand, *operand_id) {
                        if value.is_pointer() {
                            self.mark_flow(&value, "parameter of external call");
                        }
                    }
                }
                if let Some(result_id) = result_id {
                    self.new_value(result_id, call_history, args[0].0.clone());
                }
                Ok(())
            }
            _ => {
                // A recognised scalar external: the result flows from every
                // argument the tracker knows about.
                if let Some(result_id) = result_id {
                    let result = self.new_value(result_id, call_history, args[0].0.clone());
                    for (index, operand_id) in instr.operands.iter().enumerate() {
                        if let Some(operand) = args.get(index + 1) {
                            if let Some(value) = self.resolve(operand, *operand_id) {
                                self.add_flow_to_non_pointer(&value, &result);
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// The allocation size a recognised external produces, when its size
    /// operands are concrete. `args[0]` is the result expression.
    fn external_allocation_size(&self, known: KnownNames, args: &[Operand]) -> Option<u64> {
        use KnownNames::*;
        match known {
            Malloc | CxxNew | CxxNewArray => args.get(1).and_then(|arg| arg.0.as_constant()),
            Calloc => {
                let count = args.get(1).and_then(|arg| arg.0.as_constant())?;
                let size = args.get(2).and_then(|arg| arg.0.as_constant())?;
                count.checked_mul(size)
            }
            Realloc => args.get(2).and_then(|arg| arg.0.as_constant()),
            _ => ::std::option::Option::None,
        }
    }

    /// Builds dependencies out of a phi node: flow from the operand selected
    /// by the incoming block index.
    #[logfn_inputs(TRACE)]
    pub fn execute_phi(
        &self,
        instr: &Rc<Instruction>,
        incoming_index: usize,
        call_history: &CallHistory,
        arg: &Operand,
    ) -> Result<(), TransferError> {
        let incoming = match &instr.opcode {
            Opcode::Phi { incoming } => incoming,
            _ => return Err(TransferError::UnhandledArgumentCount),
        };
        let chosen = *incoming
            .get(incoming_index)
            .ok_or(TransferError::UnhandledArgumentCount)?;
        let result_id = instr.result.ok_or(TransferError::UnhandledArgumentCount)?;
        let result = self.new_value(result_id, call_history, arg.0.clone());
        match self.resolve(&(arg.0.clone(), arg.1.clone()), chosen) {
            Some(value) => {
                self.add_flow(&value, &result);
                Ok(())
            }
            None if arg.0.is_constant() => Ok(()),
            None => Err(TransferError::OperandNotFound(chosen)),
        }
    }

    /// Load/store transfer with bounds-check feedback: when the executor has
    /// just proven the access in bounds, the address's pointer flow becomes
    /// part of the core with its offset bounds slackened to the checked
    /// offset.
    #[logfn_inputs(TRACE)]
    pub fn execute_memory_operation(
        &self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        args: &[Operand],
        bounds_check_passed: bool,
    ) -> Result<(), TransferError> {
        if bounds_check_passed {
            let address_operand = match instr.opcode {
                Opcode::Load => 0,
                Opcode::Store => 1,
                _ => return Err(TransferError::UnhandledArgumentCount),
            };
            let address_id = instr.operands[address_operand];
            if let Some(address_value) = self.latest_value(address_id) {
                self.mark_all_pointer_values(
                    &address_value,
                    &format!("pointer use {}", instr.location_tag()),
                );
            }
        }
        self.execute(instr, call_history, args)
    }

    // --- call and return binding ----------------------------------------

    /// Records the expressions of a call's arguments, pushes the call onto
    /// the stack, and rebinds the arguments to the callee's parameter ids as
    /// fresh versions inheriting the flow. `call_history` is updated to the
    /// callee's activation.
    #[logfn_inputs(TRACE)]
    pub fn bind_call_arguments(
        &self,
        site: &Rc<Instruction>,
        call_history: &mut CallHistory,
        args: &[Operand],
    ) -> Result<(), TransferError> {
        if call_history.len() >= k_limits::MAX_CALL_DEPTH {
            return Err(TransferError::CallDepthExceeded);
        }
        let parameters = match &site.opcode {
            Opcode::Call { parameters, .. } => parameters.clone(),
            _ => return Err(TransferError::UnhandledArgumentCount),
        };
        let mut argument_values = Vec::with_capacity(site.operands.len());
        for (index, operand_id) in site.operands.iter().enumerate() {
            let operand = args
                .get(index)
                .ok_or(TransferError::UnhandledArgumentCount)?;
            let value = match self.resolve(operand, *operand_id) {
                Some(value) => value,
                // No source dependency information, e.g. a constant.
                None => self.new_value(*operand_id, call_history, operand.0.clone()),
            };
            argument_values.push(value);
        }
        *self.argument_values.borrow_mut() = argument_values.clone();

        call_history.push(site.id);
        let height = self.stack.borrow().len();
        self.stack
            .borrow_mut()
            .push(StoreFrame::new(Some(site.id), height));

        for (parameter, argument) in parameters.iter().zip(argument_values) {
            let bound = self.new_value(*parameter, call_history, argument.expression().clone());
            self.add_flow(&argument, &bound);
        }
        Ok(())
    }

    /// Propagates the dependency due to the return value of a call, then pops
    /// the callee's activation from the stack and the call history.
    #[logfn_inputs(TRACE)]
    pub fn bind_return_value(
        &self,
        site: &Rc<Instruction>,
        call_history: &mut CallHistory,
        ret_instr: &Rc<Instruction>,
        return_value: Option<ExprRef>,
    ) -> Result<(), TransferError> {
        let returned = match (&ret_instr.opcode, return_value) {
            (Opcode::Return, Some(expr)) => ret_instr
                .operands
                .first()
                .and_then(|id| self.latest_value(*id))
                .map(|value| (value, expr)),
            (Opcode::Return, None) => None, // Function returning void.
            _ => return Err(TransferError::UnhandledArgumentCount),
        };
        if self.stack.borrow().len() > 1 {
            self.stack.borrow_mut().pop();
        }
        call_history.pop();
        if let Some((value, expr)) = returned {
            if let Some(result_id) = site.result {
                let caller_value = self.new_value(result_id, call_history, expr);
                self.add_flow(&value, &caller_value);
            }
        }
        Ok(())
    }

    // --- core marking ----------------------------------------------------

    /// Marks as core every value that flows into `target`, disabling bound
    /// interpolation on each. Depth-first over the flow sources.
    #[logfn_inputs(TRACE)]
    pub fn mark_flow(&self, target: &Rc<VersionedValue>, reason: &str) {
        target.set_as_core(reason);
        target.disable_bound_interpolation();
        for (source, _) in target.sources() {
            self.mark_flow(&source, reason);
        }
    }

    /// Marks as core every value the given value id's newest version flows
    /// from. Returns false when the id has no recorded version; constraints
    /// over plain constants have nothing to mark.
    #[logfn_inputs(TRACE)]
    pub fn mark_all_values(&self, value_id: ValueId, reason: &str) -> bool {
        match self.latest_value(value_id) {
            Some(value) => {
                self.mark_flow(&value, reason);
                true
            }
            None => false,
        }
    }

    /// Pointer-flow marking with slackening: while bound interpolation is
    /// still enabled for a value, its locations' offset bounds are adjusted
    /// to the checked offsets instead of pinning the exact offset; once
    /// disabled, marking degrades to the plain flow marker.
    #[logfn_inputs(TRACE)]
    pub fn mark_pointer_flow(
        &self,
        target: &Rc<VersionedValue>,
        checked: &Rc<VersionedValue>,
        bounds: &mut BTreeSet<ExprRef>,
        reason: &str,
    ) {
        if !target.can_interpolate_bound() {
            self.mark_flow(target, reason);
            return;
        }
        for loc in target.locations() {
            for checked_loc in checked.locations() {
                loc.adjust_offset_bound(checked_loc.offset(), bounds);
            }
            self.core_locations.borrow_mut().insert(loc);
        }
        target.set_as_core(reason);
        for (source, _) in target.sources() {
            self.mark_pointer_flow(&source, checked, bounds, reason);
        }
        if let Some(address) = target.load_address() {
            self.mark_flow(&address, reason);
        }
        if let Some(address) = target.store_address() {
            self.mark_flow(&address, reason);
        }
    }

    /// Marks the pointer flow of `value` as core, using the value itself as
    /// the checked address.
    #[logfn_inputs(TRACE)]
    pub fn mark_all_pointer_values(&self, value: &Rc<VersionedValue>, reason: &str) {
        let mut bounds = BTreeSet::new();
        self.mark_pointer_flow(value, value, &mut bounds, reason);
    }

    pub fn core_locations(&self) -> BTreeSet<Rc<MemoryLocation>> {
        self.core_locations.borrow().clone()
    }

    // --- summary extraction ----------------------------------------------

    /// Retrieves the locations known at this state and the expressions stored
    /// in them, as a pair of the concretely addressed and the symbolically
    /// addressed store parts. Only entries whose allocation context is a
    /// prefix of `call_history` are visible.
    ///
    /// With `core_only`, only values marked core are returned, renamed to
    /// their shadow arrays (unless `shadowing` is disabled by configuration),
    /// with the shadows used accumulated in `replacements` so the caller can
    /// quantify over them.
    #[logfn_inputs(TRACE)]
    pub fn get_stored_expressions(
        &self,
        call_history: &[InstrId],
        shadow: &ShadowArrays,
        replacements: &mut Vec<Rc<Array>>,
        core_only: bool,
        shadowing: bool,
    ) -> (ConcreteStore, SymbolicStore) {
        let mut concrete = ConcreteStore::new();
        let mut symbolic = SymbolicStore::new();
        let global = self.global_frame.borrow();
        let stack = self.stack.borrow();
        let frames = std::iter::once(&*global).chain(stack.iter());
        for frame in frames {
            for (loc, (_, value)) in frame.concrete_entries() {
                if !loc.context().is_prefix_of(call_history) && !loc.is_global() {
                    continue;
                }
                let stored = match self.snapshot(value, shadow, replacements, core_only, shadowing)
                {
                    Some(stored) => stored,
                    None => continue,
                };
                concrete
                    .entry(loc.context().site_id())
                    .or_default()
                    .insert(StoredAddress::create(loc.clone()), stored);
            }
            for (loc, (_, value)) in frame.symbolic_entries() {
                if !loc.context().is_prefix_of(call_history) && !loc.is_global() {
                    continue;
                }
                let stored = match self.snapshot(value, shadow, replacements, core_only, shadowing)
                {
                    Some(stored) => stored,
                    None => continue,
                };
                symbolic
                    .entry(loc.context().site_id())
                    .or_default()
                    .push((StoredAddress::create(loc.clone()), stored));
            }
        }
        (concrete, symbolic)
    }

    fn snapshot(
        &self,
        value: &Rc<VersionedValue>,
        shadow: &ShadowArrays,
        replacements: &mut Vec<Rc<Array>>,
        core_only: bool,
        shadowing: bool,
    ) -> Option<Rc<StoredValue>> {
        if !core_only {
            return Some(StoredValue::create(value));
        }
        // An address is in the core if it stores a value that is in the core.
        if !value.is_core() {
            return None;
        }
        if shadowing {
            Some(StoredValue::create_shadowed(value, shadow, replacements))
        } else {
            Some(StoredValue::create(value))
        }
    }

    /// Registers a fresh symbolic object: the result of `klee_make_symbolic`
    /// style intrinsics is a pointer to an unknown-size allocation at the
    /// intrinsic's site.
    #[logfn_inputs(TRACE)]
    pub fn execute_make_symbolic(
        &self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        address: ExprRef,
    ) -> Rc<VersionedValue> {
        let result_id = instr.result.unwrap_or_else(|| {
            ValueId(instr.id.0)
        });
        self.new_pointer_value(instr, result_id, call_history, address, None, false)
    }
}

impl Debug for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let values = self.values_map.borrow();
        writeln!(f, "values: {}", values.len())?;
        writeln!(f, "global frame: {:?}", self.global_frame.borrow())?;
        for frame in self.stack.borrow().iter() {
            writeln!(f, "{:?}", frame)?;
        }
        if self.parent.is_some() {
            writeln!(f, "--------- parent dependency ----------")?;
        }
        Ok(())
    }
}
