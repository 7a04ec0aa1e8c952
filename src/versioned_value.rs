// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{Array, ExprRef, Expression};
use crate::memory_location::MemoryLocation;
use crate::program::{CallHistory, InstrId, ValueId};
use crate::shadow_array::ShadowArrays;

use log_derive::logfn_inputs;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An SSA-like instance of a value of the interpreted program. A symbolic
/// execution may pass through the same instruction many times, so values
/// carry a version: each transfer of a defining instruction creates a new
/// `VersionedValue` for the same `ValueId`.
///
/// Values are shared by reference between a node and its descendants. Flow
/// edges always point at values constructed earlier, so the source graph is
/// acyclic and plain reference counting suffices. After construction the only
/// mutations are the monotonic marking bits (`core` can only go false→true,
/// `can_interpolate_bound` only true→false) and location/edge registration
/// during the defining instruction's transfer.
pub struct VersionedValue {
    /// Unique per-run id, also the identity used for equality and hashing.
    id: u64,
    value_id: ValueId,
    call_history: CallHistory,
    expr: ExprRef,
    /// The memory locations this value may point to. Non-empty means the
    /// value is a pointer.
    locations: RefCell<Vec<Rc<MemoryLocation>>>,
    /// Flow sources: the values this one was computed from, each optionally
    /// tagged with the memory location the flow went through when the edge
    /// was created by a load or store.
    sources: RefCell<Vec<(Rc<VersionedValue>, Option<Rc<MemoryLocation>>)>>,
    /// The address value of the load that produced this value, if any.
    load_address: RefCell<Option<Rc<VersionedValue>>>,
    /// The address value of the store that last wrote this value, if any.
    store_address: RefCell<Option<Rc<VersionedValue>>>,
    core: Cell<bool>,
    can_interpolate_bound: Cell<bool>,
    reasons: RefCell<BTreeSet<String>>,
}

impl VersionedValue {
    pub fn create(
        id: u64,
        value_id: ValueId,
        call_history: CallHistory,
        expr: ExprRef,
    ) -> Rc<VersionedValue> {
        Rc::new(VersionedValue {
            id,
            value_id,
            call_history,
            expr,
            locations: RefCell::new(Vec::new()),
            sources: RefCell::new(Vec::new()),
            load_address: RefCell::new(None),
            store_address: RefCell::new(None),
            core: Cell::new(false),
            can_interpolate_bound: Cell::new(true),
            reasons: RefCell::new(BTreeSet::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value_id(&self) -> ValueId {
        self.value_id
    }

    pub fn call_history(&self) -> &CallHistory {
        &self.call_history
    }

    pub fn expression(&self) -> &ExprRef {
        &self.expr
    }

    /// Registers a memory location this value may point to.
    #[logfn_inputs(TRACE)]
    pub fn add_location(&self, loc: Rc<MemoryLocation>) {
        let mut locations = self.locations.borrow_mut();
        if !locations.contains(&loc) {
            locations.push(loc);
        }
    }

    pub fn locations(&self) -> Vec<Rc<MemoryLocation>> {
        self.locations.borrow().clone()
    }

    pub fn is_pointer(&self) -> bool {
        !self.locations.borrow().is_empty()
    }

    /// Appends a flow edge from `source`, optionally via the location the
    /// value flowed through. Sources are always older than their dependents;
    /// a self edge would create a cycle and is forbidden.
    #[logfn_inputs(TRACE)]
    pub fn add_dependency(&self, source: Rc<VersionedValue>, via: Option<Rc<MemoryLocation>>) {
        assert!(source.id != self.id, "flow edge must not close a cycle");
        debug_assert!(
            !source.flows_from_id(self.id),
            "flow edge must not close a cycle"
        );
        self.sources.borrow_mut().push((source, via));
    }

    fn flows_from_id(&self, id: u64) -> bool {
        self.sources
            .borrow()
            .iter()
            .any(|(source, _)| source.id == id || source.flows_from_id(id))
    }

    pub fn sources(&self) -> Vec<(Rc<VersionedValue>, Option<Rc<MemoryLocation>>)> {
        self.sources.borrow().clone()
    }

    pub fn set_load_address(&self, address: Rc<VersionedValue>) {
        *self.load_address.borrow_mut() = Some(address);
    }

    pub fn load_address(&self) -> Option<Rc<VersionedValue>> {
        self.load_address.borrow().clone()
    }

    pub fn set_store_address(&self, address: Rc<VersionedValue>) {
        *self.store_address.borrow_mut() = Some(address);
    }

    pub fn store_address(&self) -> Option<Rc<VersionedValue>> {
        self.store_address.borrow().clone()
    }

    /// Marks this value as belonging to the unsatisfiability core, recording
    /// why. Idempotent; the mark is never cleared.
    #[logfn_inputs(TRACE)]
    pub fn set_as_core(&self, reason: &str) {
        self.core.set(true);
        if !reason.is_empty() {
            self.reasons.borrow_mut().insert(reason.to_string());
        }
    }

    pub fn is_core(&self) -> bool {
        self.core.get()
    }

    /// Permanently disables offset-bound interpolation for this value. Once
    /// disabled, pointer-flow marking degrades to plain flow marking.
    pub fn disable_bound_interpolation(&self) {
        self.can_interpolate_bound.set(false);
    }

    pub fn can_interpolate_bound(&self) -> bool {
        self.can_interpolate_bound.get()
    }

    pub fn reasons(&self) -> BTreeSet<String> {
        self.reasons.borrow().clone()
    }
}

impl PartialEq for VersionedValue {
    fn eq(&self, other: &VersionedValue) -> bool {
        self.id == other.id
    }
}

impl Eq for VersionedValue {}

impl Hash for VersionedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for VersionedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "V")?;
        if self.core.get() {
            write!(f, "(I)")?;
        }
        write!(f, "[{}:{}]#{}", self.value_id, self.expr, self.id)
    }
}

impl Display for VersionedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Debug::fmt(self, f)
    }
}

/// A persistent snapshot of a versioned value for storage in a subsumption
/// table entry. For pointer values the snapshot records, per allocation site,
/// the offset bounds established by slackening (the weakest precondition of
/// the memory checks seen) and the offsets the pointer had, to be checked
/// against a candidate state's offsets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredValue {
    expr: ExprRef,
    allocation_bounds: BTreeMap<InstrId, BTreeSet<ExprRef>>,
    allocation_offsets: BTreeMap<InstrId, BTreeSet<ExprRef>>,
    use_bound: bool,
    core_reasons: BTreeSet<String>,
}

impl StoredValue {
    /// Snapshots `value` without shadowing, for reading a candidate state's
    /// store.
    #[logfn_inputs(TRACE)]
    pub fn create(value: &Rc<VersionedValue>) -> Rc<StoredValue> {
        Self::init(value, None)
    }

    /// Snapshots `value` with every array renamed to its shadow, for storage
    /// in a table entry; the shadows used are accumulated in `replacements`.
    #[logfn_inputs(TRACE)]
    pub fn create_shadowed(
        value: &Rc<VersionedValue>,
        shadow: &ShadowArrays,
        replacements: &mut Vec<Rc<Array>>,
    ) -> Rc<StoredValue> {
        Self::init(value, Some((shadow, replacements)))
    }

    fn init(
        value: &Rc<VersionedValue>,
        mut shadowing: Option<(&ShadowArrays, &mut Vec<Rc<Array>>)>,
    ) -> Rc<StoredValue> {
        let mut rename = |expr: &ExprRef| -> ExprRef {
            match shadowing.as_mut() {
                Some((shadow, replacements)) => shadow.get_shadow_expression(expr, replacements),
                None => expr.clone(),
            }
        };
        let expr = rename(value.expression());
        let mut allocation_bounds: BTreeMap<InstrId, BTreeSet<ExprRef>> = BTreeMap::new();
        let mut allocation_offsets: BTreeMap<InstrId, BTreeSet<ExprRef>> = BTreeMap::new();
        for loc in value.locations() {
            let site = loc.context().site_id();
            let bounds = allocation_bounds.entry(site).or_default();
            for bound in loc.bound_expressions() {
                bounds.insert(rename(&bound));
            }
            allocation_offsets
                .entry(site)
                .or_default()
                .insert(rename(loc.offset()));
        }
        Rc::new(StoredValue {
            expr,
            allocation_bounds,
            allocation_offsets,
            use_bound: value.can_interpolate_bound(),
            core_reasons: value.reasons(),
        })
    }

    pub fn expression(&self) -> &ExprRef {
        &self.expr
    }

    pub fn is_pointer(&self) -> bool {
        !self.allocation_bounds.is_empty()
    }

    pub fn use_bound(&self) -> bool {
        self.use_bound
    }

    pub fn bounds(&self, site: InstrId) -> Option<&BTreeSet<ExprRef>> {
        self.allocation_bounds.get(&site)
    }

    pub fn offsets(&self, site: InstrId) -> Option<&BTreeSet<ExprRef>> {
        self.allocation_offsets.get(&site)
    }

    pub fn reasons(&self) -> &BTreeSet<String> {
        &self.core_reasons
    }

    /// The weakest precondition comparing a candidate state's pointer against
    /// this entry's recorded bounds: every offset of the state must stay
    /// below every bound of the entry. Constant pairs are folded away; a
    /// constant violation collapses the whole check to FALSE, which tells the
    /// caller not to trust the state for subsumption.
    #[logfn_inputs(TRACE)]
    pub fn get_bounds_check(&self, state: &StoredValue) -> ExprRef {
        let mut result: Option<ExprRef> = None;
        for (site, bounds) in &self.allocation_bounds {
            let offsets = match state.allocation_offsets.get(site) {
                Some(offsets) => offsets,
                None => continue,
            };
            for bound in bounds {
                for offset in offsets {
                    match (offset.as_constant(), bound.as_constant()) {
                        (Some(o), Some(b)) => {
                            if o >= b {
                                return Expression::bool_false();
                            }
                        }
                        _ => {
                            let check = Expression::ult(offset.clone(), bound.clone());
                            result = Some(match result {
                                Some(acc) => Expression::and(acc, check),
                                None => check,
                            });
                        }
                    }
                }
            }
        }
        result.unwrap_or_else(Expression::bool_true)
    }
}

impl Display for StoredValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.expr)?;
        if self.is_pointer() {
            f.write_str(" bounds=[")?;
            for (i, (site, bounds)) in self.allocation_bounds.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}:{{", site)?;
                for (j, bound) in bounds.iter().enumerate() {
                    if j > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", bound)?;
                }
                f.write_str("}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
