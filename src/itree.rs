// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::dependency::{Dependency, Operand, TransferError};
use crate::expression::{Array, ExprRef, Expression};
use crate::options::InterpolationOptions;
use crate::path_condition::{PathCondition, PathConditionMarker};
use crate::program::{CallHistory, ExecutionState, Instruction, TargetData, ValueId};
use crate::search_graph::SearchGraph;
use crate::shadow_array::ShadowArrays;
use crate::smt_solver::SmtSolver;
use crate::subsumption::{SubsumptionStats, SubsumptionTableEntry, WpUpdateError};
use crate::utils::TimeStat;

use log::debug;
use log_derive::{logfn, logfn_inputs};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult, Write as FmtWrite};
use std::rc::{Rc, Weak};

/// Wall-clock accumulators for every named tree and node method, dumped when
/// running-time statistics are enabled.
#[derive(Debug, Default)]
pub struct TreeTimers {
    pub set_current: TimeStat,
    pub remove: TimeStat,
    pub check_subsumption: TimeStat,
    pub mark_path_condition: TimeStat,
    pub split: TimeStat,
    pub execute: TimeStat,
    pub get_interpolant: TimeStat,
    pub add_constraint: TimeStat,
    pub make_marker_map: TimeStat,
    pub bind_call_arguments: TimeStat,
    pub pop_abstract_dependency_frame: TimeStat,
    pub get_stored_expressions: TimeStat,
}

/// A node of the interpolation tree, shadowing one node of the executor's
/// path tree. It owns the dependency tracker for its segment of the path and
/// the head of the path-condition list, which shares cells with the parent up
/// to the split point.
///
/// Parents own their children; children hold a non-owning back reference.
pub struct ITreeNode {
    node_id: u64,
    /// Assigned lazily the first time the node becomes current.
    program_point: Cell<Option<u64>>,
    parent: Weak<ITreeNode>,
    left: RefCell<Option<Rc<ITreeNode>>>,
    right: RefCell<Option<Rc<ITreeNode>>>,
    path_condition: RefCell<Option<Rc<PathCondition>>>,
    dependency: Rc<Dependency>,
    /// The call history last seen while this node was current, used when the
    /// node is summarised into a table entry.
    call_history: RefCell<CallHistory>,
    is_subsumed: Cell<bool>,
}

impl ITreeNode {
    fn new_root(node_id: u64, target_data: Rc<TargetData>) -> Rc<ITreeNode> {
        Rc::new(ITreeNode {
            node_id,
            program_point: Cell::new(None),
            parent: Weak::new(),
            left: RefCell::new(None),
            right: RefCell::new(None),
            path_condition: RefCell::new(None),
            dependency: Dependency::new(target_data),
            call_history: RefCell::new(CallHistory::default()),
            is_subsumed: Cell::new(false),
        })
    }

    fn new_child(parent: &Rc<ITreeNode>, node_id: u64) -> Rc<ITreeNode> {
        Rc::new(ITreeNode {
            node_id,
            program_point: Cell::new(None),
            parent: Rc::downgrade(parent),
            left: RefCell::new(None),
            right: RefCell::new(None),
            path_condition: RefCell::new(parent.path_condition.borrow().clone()),
            dependency: Dependency::new_child(&parent.dependency),
            call_history: RefCell::new(parent.call_history.borrow().clone()),
            is_subsumed: Cell::new(false),
        })
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn program_point(&self) -> Option<u64> {
        self.program_point.get()
    }

    fn set_program_point(&self, program_point: u64) {
        if self.program_point.get().is_none() {
            self.program_point.set(Some(program_point));
        }
    }

    pub fn is_subsumed(&self) -> bool {
        self.is_subsumed.get()
    }

    pub fn left(&self) -> Option<Rc<ITreeNode>> {
        self.left.borrow().clone()
    }

    pub fn right(&self) -> Option<Rc<ITreeNode>> {
        self.right.borrow().clone()
    }

    pub fn dependency(&self) -> &Rc<Dependency> {
        &self.dependency
    }

    /// The tracker summaries are read from. A program point is the first
    /// instruction of a basic block, so the store to summarise (or to compare
    /// against) is the parent node's, not this node's own.
    fn summary_dependency(&self) -> Rc<Dependency> {
        self.dependency
            .parent()
            .cloned()
            .unwrap_or_else(|| self.dependency.clone())
    }

    pub fn path_condition(&self) -> Option<Rc<PathCondition>> {
        self.path_condition.borrow().clone()
    }

    /// The number of constraints on the path from the root to this node.
    pub fn path_condition_len(&self) -> usize {
        match self.path_condition.borrow().as_ref() {
            Some(pc) => pc.len(),
            None => 0,
        }
    }

    fn record_call_history(&self, call_history: &[crate::program::InstrId]) {
        *self.call_history.borrow_mut() = call_history.to_vec();
    }

    /// Prepends a constraint to this node's path condition, owned by the
    /// versioned value the constraint was generated from.
    fn add_constraint(&self, constraint: ExprRef, condition: Option<ValueId>) -> Rc<PathCondition> {
        let pc = PathCondition::new(
            constraint,
            &self.dependency,
            condition,
            self.path_condition.borrow().clone(),
        );
        *self.path_condition.borrow_mut() = Some(pc.clone());
        pc
    }

    fn split(self: &Rc<ITreeNode>, left_id: u64, right_id: u64) -> (Rc<ITreeNode>, Rc<ITreeNode>) {
        assert!(
            self.left.borrow().is_none() && self.right.borrow().is_none(),
            "node split twice"
        );
        let left = ITreeNode::new_child(self, left_id);
        let right = ITreeNode::new_child(self, right_id);
        *self.left.borrow_mut() = Some(left.clone());
        *self.right.borrow_mut() = Some(right.clone());
        (left, right)
    }

    /// Folds the in-interpolant constraints of this node's path condition
    /// into a shadow-renamed conjunction.
    #[logfn_inputs(TRACE)]
    pub fn get_interpolant(
        &self,
        shadow: &ShadowArrays,
        replacements: &mut Vec<Rc<Array>>,
    ) -> Option<ExprRef> {
        self.path_condition
            .borrow()
            .as_ref()
            .and_then(|pc| pc.pack_interpolant(shadow, replacements))
    }

    /// Builds the mapping from each path-condition constraint to a marker
    /// used by the subsumption check to record which constraints the
    /// unsatisfiability core used. Disjunctive constraints additionally map
    /// each disjunct to the same marker, because the disjuncts are solved
    /// separately when states were merged.
    #[logfn_inputs(TRACE)]
    pub fn make_marker_map(&self) -> HashMap<ExprRef, Rc<PathConditionMarker>> {
        let mut result = HashMap::new();
        let mut cell = self.path_condition.borrow().clone();
        while let Some(pc) = cell {
            let marker = PathConditionMarker::new(pc.clone());
            if let Expression::Or { left, right } = &**pc.car() {
                result.insert(left.clone(), marker.clone());
                result.insert(right.clone(), marker.clone());
            }
            result.insert(pc.car().clone(), marker);
            cell = pc.cdr().cloned();
        }
        result
    }

    fn print_into(&self, out: &mut String, edges: &str, current_id: u64) {
        if let Some(left) = self.left.borrow().as_ref() {
            out.push('\n');
            let _ = write!(out, "{}+-- L:{}", edges, left.node_id);
            if left.node_id == current_id {
                out.push_str(" (active)");
            }
            if self.right.borrow().is_some() {
                left.print_into(out, &format!("{}|   ", edges), current_id);
            } else {
                left.print_into(out, &format!("{}    ", edges), current_id);
            }
        }
        if let Some(right) = self.right.borrow().as_ref() {
            out.push('\n');
            let _ = write!(out, "{}+-- R:{}", edges, right.node_id);
            if right.node_id == current_id {
                out.push_str(" (active)");
            }
            right.print_into(out, &format!("{}    ", edges), current_id);
        }
    }
}

impl Debug for ITreeNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "ITreeNode")?;
        writeln!(f, "  node id = {}", self.node_id)?;
        match self.path_condition.borrow().as_ref() {
            Some(pc) => writeln!(f, "  path condition = {}", pc)?,
            None => writeln!(f, "  path condition = []")?,
        }
        writeln!(f, "  subsumed = {}", self.is_subsumed.get())
    }
}

/// The interpolation tree: a binary tree shadowing the symbolic executor's
/// path tree, together with the program-point-indexed subsumption table the
/// finished subtrees are summarised into.
///
/// One node is current at a time; the executor drives the tree through
/// `set_current_node`, the `execute` family, `split`, the subsumption check
/// and `remove`, strictly single-threaded.
pub struct ITree {
    options: InterpolationOptions,
    root: Rc<ITreeNode>,
    current: Rc<ITreeNode>,
    subsumption_table: HashMap<u64, Vec<SubsumptionTableEntry>>,
    shadow: RefCell<ShadowArrays>,
    graph: Option<SearchGraph>,
    next_node_id: u64,
    timers: TreeTimers,
    subsumption_stats: SubsumptionStats,
}

impl ITree {
    pub fn new(options: InterpolationOptions, target_data: TargetData) -> ITree {
        let root = ITreeNode::new_root(1, Rc::new(target_data));
        let graph = if options.output_tree {
            Some(SearchGraph::new(root.node_id))
        } else {
            None
        };
        ITree {
            options,
            current: root.clone(),
            root,
            subsumption_table: HashMap::new(),
            shadow: RefCell::new(ShadowArrays::new()),
            graph,
            next_node_id: 2,
            timers: TreeTimers::default(),
            subsumption_stats: SubsumptionStats::default(),
        }
    }

    pub fn root(&self) -> &Rc<ITreeNode> {
        &self.root
    }

    pub fn current(&self) -> &Rc<ITreeNode> {
        &self.current
    }

    pub fn options(&self) -> &InterpolationOptions {
        &self.options
    }

    /// Registers a symbolic array with the shadow registry, so constraints
    /// over it can later be lifted into interpolants.
    #[logfn_inputs(TRACE)]
    pub fn register_symbolic_array(&mut self, array: &Rc<Array>) -> Rc<Array> {
        self.shadow.borrow_mut().register(array)
    }

    /// Transfer for `klee_make_symbolic` style intrinsics: registers the
    /// array's shadow and gives the current node a fresh pointer value for
    /// the symbolic object.
    #[logfn_inputs(TRACE)]
    pub fn execute_make_symbolic(
        &mut self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        address: ExprRef,
        array: &Rc<Array>,
    ) {
        self.shadow.borrow_mut().register(array);
        self.current
            .dependency()
            .execute_make_symbolic(instr, call_history, address);
    }

    /// Makes `node` the current node and assigns its program point on first
    /// visit.
    #[logfn_inputs(TRACE)]
    pub fn set_current_node(&mut self, node: &Rc<ITreeNode>, state: &ExecutionState) {
        self.timers.set_current.start();
        node.set_program_point(state.pc.instruction.0);
        node.record_call_history(&state.call_history);
        self.current = node.clone();
        if let Some(graph) = &mut self.graph {
            let name = format!("{} line {}", state.pc.function, state.pc.line);
            graph.set_current_node(node.node_id, &name);
        }
        self.timers.set_current.end();
    }

    /// Splits the current parent into a false child and a true child, each
    /// inheriting the parent's dependency state copy-on-write.
    #[logfn_inputs(TRACE)]
    pub fn split(&mut self, parent: &Rc<ITreeNode>) -> (Rc<ITreeNode>, Rc<ITreeNode>) {
        self.timers.split.start();
        let left_id = self.next_node_id;
        let right_id = self.next_node_id + 1;
        self.next_node_id += 2;
        let children = parent.split(left_id, right_id);
        if let Some(graph) = &mut self.graph {
            graph.add_children(parent.node_id, left_id, right_id);
        }
        self.timers.split.end();
        children
    }

    /// Prepends a constraint to the current node's path condition. The
    /// condition value id ties the constraint to the versioned value it was
    /// generated from, so core marking can follow its flow.
    #[logfn_inputs(TRACE)]
    pub fn add_constraint(&mut self, constraint: ExprRef, condition: Option<ValueId>) {
        self.timers.add_constraint.start();
        let pc = self.current.add_constraint(constraint.clone(), condition);
        if let Some(graph) = &mut self.graph {
            let key = Rc::as_ptr(&pc) as usize;
            graph.add_path_condition(self.current.node_id, key, &constraint);
        }
        self.timers.add_constraint.end();
    }

    /// Abstract dependency state transition for one instruction of the
    /// current node.
    #[logfn_inputs(TRACE)]
    pub fn execute(
        &mut self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        args: &[Operand],
    ) -> Result<(), TransferError> {
        self.timers.execute.start();
        self.current.record_call_history(call_history);
        let result = self.current.dependency().execute(instr, call_history, args);
        self.timers.execute.end();
        result
    }

    /// Phi transfer with the incoming block index chosen by the executor.
    #[logfn_inputs(TRACE)]
    pub fn execute_phi(
        &mut self,
        instr: &Rc<Instruction>,
        incoming_index: usize,
        call_history: &CallHistory,
        arg: &Operand,
    ) -> Result<(), TransferError> {
        self.timers.execute.start();
        self.current.record_call_history(call_history);
        let result = self
            .current
            .dependency()
            .execute_phi(instr, incoming_index, call_history, arg);
        self.timers.execute.end();
        result
    }

    /// Load/store transfer; a passed bounds check marks the address's pointer
    /// flow as core with slackened bounds.
    #[logfn_inputs(TRACE)]
    pub fn execute_memory_operation(
        &mut self,
        instr: &Rc<Instruction>,
        call_history: &CallHistory,
        args: &[Operand],
        bounds_check_passed: bool,
    ) -> Result<(), TransferError> {
        self.timers.execute.start();
        self.current.record_call_history(call_history);
        let result = self.current.dependency().execute_memory_operation(
            instr,
            call_history,
            args,
            bounds_check_passed,
        );
        self.timers.execute.end();
        result
    }

    /// Records a call's arguments and pushes the callee's activation.
    #[logfn_inputs(TRACE)]
    pub fn bind_call_arguments(
        &mut self,
        site: &Rc<Instruction>,
        call_history: &mut CallHistory,
        args: &[Operand],
    ) -> Result<(), TransferError> {
        self.timers.bind_call_arguments.start();
        let result = self
            .current
            .dependency()
            .bind_call_arguments(site, call_history, args);
        self.current.record_call_history(call_history);
        self.timers.bind_call_arguments.end();
        result
    }

    /// Pops the callee's activation, propagating the return value into the
    /// caller's result slot.
    #[logfn_inputs(TRACE)]
    pub fn pop_abstract_dependency_frame(
        &mut self,
        site: &Rc<Instruction>,
        call_history: &mut CallHistory,
        ret_instr: &Rc<Instruction>,
        return_value: Option<ExprRef>,
    ) -> Result<(), TransferError> {
        self.timers.pop_abstract_dependency_frame.start();
        let result =
            self.current
                .dependency()
                .bind_return_value(site, call_history, ret_instr, return_value);
        self.current.record_call_history(call_history);
        self.timers.pop_abstract_dependency_frame.end();
        result
    }

    /// Tries every table entry recorded for the current program point, in
    /// insertion order; the first entry that subsumes the state wins. On
    /// success the current node is marked subsumed and will not be tabled.
    #[logfn_inputs(TRACE)]
    #[logfn(DEBUG)]
    pub fn check_current_state_subsumption(
        &mut self,
        solver: &mut dyn SmtSolver,
        state: &ExecutionState,
        timeout: f64,
    ) -> bool {
        if !self.options.interpolation {
            return false;
        }
        self.timers.check_subsumption.start();
        let current = self.current.clone();
        let program_point = match current.program_point() {
            Some(pp) if pp == state.pc.instruction.0 => pp,
            _ => {
                self.timers.check_subsumption.end();
                return false;
            }
        };
        self.timers.make_marker_map.start();
        let marker_map = current.make_marker_map();
        self.timers.make_marker_map.end();
        let dependency = current.summary_dependency();
        let mut subsumed_by = None;
        if let Some(entries) = self.subsumption_table.get(&program_point) {
            let shadow = self.shadow.borrow();
            for (index, entry) in entries.iter().enumerate() {
                if entry.subsumed(
                    solver,
                    state,
                    &dependency,
                    &marker_map,
                    &shadow,
                    &mut self.subsumption_stats,
                    timeout,
                ) {
                    subsumed_by = Some(index);
                    break;
                }
            }
        }
        let result = match subsumed_by {
            Some(index) => {
                // Mark as subsumed so the node will not be stored into the
                // table; the table already contains a more general entry.
                current.is_subsumed.set(true);
                if let Some(graph) = &mut self.graph {
                    graph.mark_as_subsumed(current.node_id, (program_point, index));
                }
                self.sync_graph_interpolant_flags(&current);
                true
            }
            None => false,
        };
        self.timers.check_subsumption.end();
        result
    }

    /// On an infeasible branch: mark the branch condition's dependencies and
    /// every path-condition constraint the unsatisfiability core names, in
    /// order. Core constraints missing from the path condition are skipped;
    /// this happens when constraints were merged away.
    #[logfn_inputs(TRACE)]
    pub fn mark_path_condition(
        &mut self,
        solver: &dyn SmtSolver,
        branch_condition: Option<ValueId>,
    ) {
        self.timers.mark_path_condition.start();
        let unsat_core = solver.get_unsat_core();
        let current = self.current.clone();
        let dependency = current.dependency().clone();
        if let Some(condition) = branch_condition {
            dependency.mark_all_values(condition, "infeasible branch condition");
        }
        let mut cell = current.path_condition();
        for constraint in unsat_core.iter().rev() {
            let mut found = false;
            while let Some(pc) = cell.clone() {
                cell = pc.cdr().cloned();
                if pc.car() == constraint {
                    pc.include_in_interpolant(&dependency);
                    found = true;
                    break;
                }
            }
            if cell.is_none() && !found {
                break;
            }
        }
        self.sync_graph_interpolant_flags(&current);
        self.timers.mark_path_condition.end();
    }

    /// Copies the in-interpolant flags of a node's path condition into the
    /// rendered graph.
    fn sync_graph_interpolant_flags(&mut self, node: &Rc<ITreeNode>) {
        if let Some(graph) = &mut self.graph {
            let mut cell = node.path_condition();
            while let Some(pc) = cell {
                if pc.car_in_interpolant() {
                    graph.include_in_interpolant(Rc::as_ptr(&pc) as usize);
                }
                cell = pc.cdr().cloned();
            }
        }
    }

    /// Removes a fully explored leaf. The node is summarised into a new
    /// subsumption-table entry first, unless it was itself subsumed; then the
    /// removal walks up through ancestors that have no children left,
    /// strictly post-order.
    #[logfn_inputs(TRACE)]
    pub fn remove(&mut self, node: &Rc<ITreeNode>) {
        self.timers.remove.start();
        assert!(
            node.left.borrow().is_none() && node.right.borrow().is_none(),
            "only leaves can be removed"
        );
        let mut node = node.clone();
        loop {
            let parent = node.parent.upgrade();

            // The node is about to be deleted and has been completely
            // traversed, so this is the time to table its interpolant.
            if !node.is_subsumed() && self.options.interpolation {
                if let Some(program_point) = node.program_point() {
                    let entry = self.table_entry_for(&node, program_point);
                    let bucket = self.subsumption_table.entry(program_point).or_default();
                    bucket.push(entry);
                    let index = bucket.len() - 1;
                    if let Some(graph) = &mut self.graph {
                        graph.add_table_entry_mapping(node.node_id, (program_point, index));
                    }
                    debug!(
                        "tabled entry {} for program point {}",
                        index, program_point
                    );
                }
            }

            let parent = match parent {
                Some(parent) => parent,
                None => break,
            };
            let is_left = parent
                .left
                .borrow()
                .as_ref()
                .map_or(false, |left| Rc::ptr_eq(left, &node));
            if is_left {
                *parent.left.borrow_mut() = None;
            } else {
                *parent.right.borrow_mut() = None;
            }
            if parent.left.borrow().is_some() || parent.right.borrow().is_some() {
                break;
            }
            node = parent;
        }
        self.timers.remove.end();
    }

    fn table_entry_for(&mut self, node: &Rc<ITreeNode>, program_point: u64) -> SubsumptionTableEntry {
        let shadow = self.shadow.borrow();
        let mut replacements = Vec::new();
        self.timers.get_interpolant.start();
        let interpolant = node.get_interpolant(&shadow, &mut replacements);
        self.timers.get_interpolant.end();
        let shadowing = !self.options.no_existential;
        let call_history = node.call_history.borrow().clone();
        self.timers.get_stored_expressions.start();
        let (concrete, symbolic) = node.summary_dependency().get_stored_expressions(
            &call_history,
            &shadow,
            &mut replacements,
            true,
            shadowing,
        );
        self.timers.get_stored_expressions.end();
        SubsumptionTableEntry::new(program_point, interpolant, concrete, symbolic, replacements)
    }

    /// The entries recorded at a program point, in insertion order.
    pub fn table_entries(&self, program_point: u64) -> &[SubsumptionTableEntry] {
        self.subsumption_table
            .get(&program_point)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Attaches a weakest-precondition interpolant to the newest entry at the
    /// given program point and refines the entry with it.
    pub fn update_subsumption_table_entry(
        &mut self,
        program_point: u64,
        wp_interpolant: ExprRef,
    ) -> Result<(), WpUpdateError> {
        let shadow = self.shadow.borrow();
        if let Some(entry) = self
            .subsumption_table
            .get_mut(&program_point)
            .and_then(|bucket| bucket.last_mut())
        {
            entry.set_wp_interpolant(wp_interpolant);
            entry.update_with_weakest_precondition(&shadow)?;
        }
        Ok(())
    }

    // --- statistics and debug output --------------------------------------

    pub fn check_solver_count(&self) -> u64 {
        self.subsumption_stats.check_solver_count
    }

    pub fn check_solver_failure_count(&self) -> u64 {
        self.subsumption_stats.check_solver_failure_count
    }

    /// Accumulated wall-clock seconds of actual solver calls in subsumption
    /// checks.
    pub fn actual_solver_call_time(&self) -> f64 {
        self.subsumption_stats.actual_solver_call_time.get()
    }

    pub fn timers(&self) -> &TreeTimers {
        &self.timers
    }

    /// Saves the recorded search tree in dot format. Recording must have
    /// been enabled with the `output_tree` option.
    pub fn save_graph(&self, path: &std::path::Path) -> std::io::Result<()> {
        match &self.graph {
            Some(graph) => graph.save(path),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "search tree recording is not enabled",
            )),
        }
    }

    /// Writes the tree structure and the subsumption table for debugging.
    pub fn print(&self, out: &mut String) {
        out.push_str("------------------------- ITree Structure ---------------------------\n");
        let _ = write!(out, "{}", self.root.node_id);
        if Rc::ptr_eq(&self.root, &self.current) {
            out.push_str(" (active)");
        }
        self.root.print_into(out, "", self.current.node_id);
        out.push_str("\n------------------------- Subsumption Table -------------------------\n");
        for entries in self.subsumption_table.values() {
            for entry in entries {
                let _ = write!(out, "{}", entry);
            }
        }
    }

    /// Writes the method running-time statistics.
    pub fn dump_time_stats(&self, out: &mut String) {
        if !self.options.time_stat {
            return;
        }
        let timers = &self.timers;
        let _ = writeln!(out, "ITree method execution times (ms):");
        let mut line = |name: &str, stat: &TimeStat| {
            let _ = writeln!(out, "    {} = {:.3}", name, stat.get() * 1000.0);
        };
        line("setCurrentNode", &timers.set_current);
        line("remove", &timers.remove);
        line("checkCurrentStateSubsumption", &timers.check_subsumption);
        line("markPathCondition", &timers.mark_path_condition);
        line("split", &timers.split);
        line("execute", &timers.execute);
        line("getInterpolant", &timers.get_interpolant);
        line("addConstraint", &timers.add_constraint);
        line("makeMarkerMap", &timers.make_marker_map);
        line("bindCallArguments", &timers.bind_call_arguments);
        line(
            "popAbstractDependencyFrame",
            &timers.pop_abstract_dependency_frame,
        );
        line("getStoredExpressions", &timers.get_stored_expressions);
        let _ = writeln!(
            out,
            "    solver calls (failed) = {} ({})",
            self.subsumption_stats.check_solver_count,
            self.subsumption_stats.check_solver_failure_count
        );
        let _ = writeln!(
            out,
            "    actual solver call time = {:.3}",
            self.subsumption_stats.actual_solver_call_time.get() * 1000.0
        );
    }
}

impl Debug for ITree {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut out = String::new();
        self.print(&mut out);
        f.write_str(&out)
    }
}
