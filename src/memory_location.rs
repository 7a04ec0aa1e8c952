// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{ExprRef, Expression};
use crate::program::{CallHistory, InstrId, Instruction};

use log_derive::logfn_inputs;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The identity of one allocation occurrence: the allocating instruction
/// together with the call history that reached it. The `allocation_id`
/// distinguishes repeated allocations of the same site and history across
/// loop iterations; it is the one component the weak comparison ignores,
/// since related allocations on different paths get different ids.
#[derive(Clone, Debug)]
pub struct AllocationContext {
    site: Rc<Instruction>,
    call_history: CallHistory,
    allocation_id: u64,
    /// Environment-style allocations (results of `getenv` and friends) live
    /// in the global store frame rather than any stack frame.
    global: bool,
}

impl AllocationContext {
    pub fn new(
        site: Rc<Instruction>,
        call_history: CallHistory,
        allocation_id: u64,
    ) -> Rc<AllocationContext> {
        Rc::new(AllocationContext {
            site,
            call_history,
            allocation_id,
            global: false,
        })
    }

    pub fn new_global(
        site: Rc<Instruction>,
        allocation_id: u64,
    ) -> Rc<AllocationContext> {
        Rc::new(AllocationContext {
            site,
            call_history: CallHistory::default(),
            allocation_id,
            global: true,
        })
    }

    pub fn site(&self) -> &Rc<Instruction> {
        &self.site
    }

    /// The allocation site id, used as the subsumption-table store key.
    pub fn site_id(&self) -> InstrId {
        self.site.id
    }

    pub fn call_history(&self) -> &CallHistory {
        &self.call_history
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// True iff this context's call history is a prefix of `call_history`,
    /// i.e. the allocation is visible from the activation described by
    /// `call_history`.
    pub fn is_prefix_of(&self, call_history: &[InstrId]) -> bool {
        self.call_history.len() <= call_history.len()
            && self.call_history[..] == call_history[..self.call_history.len()]
    }

    /// Weak context equality: same site, call histories matching as a prefix
    /// chain, iteration identity ignored.
    pub fn weak_eq(&self, other: &AllocationContext) -> bool {
        self.site.id == other.site.id
            && (self.is_prefix_of(&other.call_history) || other.is_prefix_of(&self.call_history))
    }
}

impl PartialEq for AllocationContext {
    fn eq(&self, other: &AllocationContext) -> bool {
        self.site.id == other.site.id
            && self.call_history == other.call_history
            && self.allocation_id == other.allocation_id
    }
}

impl Eq for AllocationContext {}

impl Hash for AllocationContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.id.hash(state);
        self.call_history.hash(state);
        self.allocation_id.hash(state);
    }
}

impl Display for AllocationContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} {}", self.site.id, self.site.location_tag())?;
        if !self.call_history.is_empty() {
            f.write_str(" via [")?;
            for (i, callsite) in self.call_history.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", callsite)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// A model of a pointer: an allocation context, the allocation's base address
/// expression, a (possibly symbolic) offset from that base, and bound
/// information limiting the maximum legal offset. Base and offset are always
/// address-width expressions.
///
/// The bound fields are the only mutable state, and they move monotonically
/// tighter: `adjust_offset_bound` lowers the concrete bound or accumulates
/// symbolic bound expressions during pointer-flow marking (slackening).
pub struct MemoryLocation {
    context: Rc<AllocationContext>,
    base: ExprRef,
    offset: ExprRef,
    /// The allocation size in bytes, when known.
    size: Option<u64>,
    concrete_offset: Option<u64>,
    concrete_bound: Cell<Option<u64>>,
    symbolic_bounds: RefCell<BTreeSet<ExprRef>>,
}

impl MemoryLocation {
    /// A location at the start of a fresh allocation: offset zero, bound the
    /// whole allocation size.
    #[logfn_inputs(TRACE)]
    pub fn create(
        context: Rc<AllocationContext>,
        base: ExprRef,
        size: Option<u64>,
    ) -> Rc<MemoryLocation> {
        let width = base.width();
        Rc::new(MemoryLocation {
            context,
            base,
            offset: Expression::constant(0, width),
            size,
            concrete_offset: Some(0),
            concrete_bound: Cell::new(size),
            symbolic_bounds: RefCell::new(BTreeSet::new()),
        })
    }

    /// A location derived from `parent` by pointer arithmetic: the context
    /// and base are inherited and the offset grows by `delta`. When both the
    /// parent offset and the delta are concrete the sum is folded and the
    /// concrete bound recomputed from the allocation size; otherwise the
    /// bound stays symbolic.
    #[logfn_inputs(TRACE)]
    pub fn create_with_offset(parent: &Rc<MemoryLocation>, delta: ExprRef) -> Rc<MemoryLocation> {
        let concrete_offset = match (parent.concrete_offset, delta.as_constant()) {
            (Some(base), Some(d)) => Some(base.wrapping_add(d)),
            _ => None,
        };
        let offset = match concrete_offset {
            Some(value) => Expression::constant(value, parent.offset.width()),
            None => Expression::add(parent.offset.clone(), delta),
        };
        let concrete_bound = match (parent.size, concrete_offset) {
            (Some(size), Some(off)) => Some(size.saturating_sub(off)),
            _ => None,
        };
        Rc::new(MemoryLocation {
            context: parent.context.clone(),
            base: parent.base.clone(),
            offset,
            size: parent.size,
            concrete_offset,
            concrete_bound: Cell::new(concrete_bound),
            symbolic_bounds: RefCell::new(parent.symbolic_bounds.borrow().clone()),
        })
    }

    /// Checks that deriving a location from `parent` by `delta` agrees with
    /// the concrete address the executor computed: `base + offset == address`.
    /// Candidates failing this check are skipped at getelementptr when other
    /// candidates remain.
    pub fn offset_consistent(
        parent: &Rc<MemoryLocation>,
        address: &ExprRef,
        delta: &ExprRef,
    ) -> bool {
        match (
            parent.base.as_constant(),
            parent.concrete_offset,
            delta.as_constant(),
            address.as_constant(),
        ) {
            (Some(base), Some(offset), Some(d), Some(address)) => {
                base.wrapping_add(offset).wrapping_add(d) == address
            }
            _ => true,
        }
    }

    pub fn context(&self) -> &Rc<AllocationContext> {
        &self.context
    }

    pub fn base(&self) -> &ExprRef {
        &self.base
    }

    pub fn offset(&self) -> &ExprRef {
        &self.offset
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn concrete_offset(&self) -> Option<u64> {
        self.concrete_offset
    }

    pub fn concrete_bound(&self) -> Option<u64> {
        self.concrete_bound.get()
    }

    pub fn symbolic_bounds(&self) -> BTreeSet<ExprRef> {
        self.symbolic_bounds.borrow().clone()
    }

    pub fn is_global(&self) -> bool {
        self.context.global
    }

    /// True iff both base and offset are concrete, selecting the concretely
    /// addressed store map.
    pub fn has_constant_address(&self) -> bool {
        self.base.is_constant() && self.concrete_offset.is_some()
    }

    /// Adjusts the recorded bound for an offset that has just passed a
    /// bounds check (slackening): the summary keeps `offset < bound` rather
    /// than pinning the exact offset. A concrete checked offset is already
    /// covered by the size-derived concrete bound, which stays in place; a
    /// symbolic checked offset accumulates in the symbolic bound set and in
    /// `bounds`. Invariant: `concrete_bound + offset <= allocation size`.
    #[logfn_inputs(TRACE)]
    pub fn adjust_offset_bound(&self, checked_offset: &ExprRef, bounds: &mut BTreeSet<ExprRef>) {
        if checked_offset.is_constant() {
            return;
        }
        self.symbolic_bounds
            .borrow_mut()
            .insert(checked_offset.clone());
        bounds.insert(checked_offset.clone());
    }

    /// The full set of bound expressions of this location: the concrete bound
    /// as a constant of offset width, plus every symbolic bound.
    pub fn bound_expressions(&self) -> BTreeSet<ExprRef> {
        let mut bounds = self.symbolic_bounds.borrow().clone();
        if let Some(bound) = self.concrete_bound.get() {
            bounds.insert(Expression::constant(bound, self.offset.width()));
        }
        bounds
    }

    /// Weak location equality used for store lookup during subsumption:
    /// contexts weak-equal, base and offset structurally equal.
    pub fn weak_eq(&self, other: &MemoryLocation) -> bool {
        self.context.weak_eq(&other.context) && self.base == other.base && self.offset == other.offset
    }

    fn identity(&self) -> (InstrId, &CallHistory, u64, &ExprRef, &ExprRef) {
        (
            self.context.site_id(),
            &self.context.call_history,
            self.context.allocation_id,
            &self.base,
            &self.offset,
        )
    }
}

impl PartialEq for MemoryLocation {
    fn eq(&self, other: &MemoryLocation) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for MemoryLocation {}

impl Hash for MemoryLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for MemoryLocation {
    fn partial_cmp(&self, other: &MemoryLocation) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemoryLocation {
    fn cmp(&self, other: &MemoryLocation) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl Debug for MemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "M[{}; base={}; offset={}]",
            self.context, self.base, self.offset
        )
    }
}

impl Display for MemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}+{}", self.base, self.offset)
    }
}

/// A memory location wrapped for use as a subsumption-table map key. The
/// comparator is weaker than the standard one for memory locations: it does
/// not check the allocation id, which distinguishes allocations of the same
/// site and call history across loop iterations. That distinction makes no
/// sense when comparing states for subsumption, as related allocations on
/// different paths carry different ids. Call histories compare as a prefix
/// chain; distinct addresses still order deterministically by site, base,
/// offset and call history.
#[derive(Clone, Debug)]
pub struct StoredAddress {
    pub loc: Rc<MemoryLocation>,
}

impl StoredAddress {
    pub fn create(loc: Rc<MemoryLocation>) -> StoredAddress {
        StoredAddress { loc }
    }
}

impl PartialEq for StoredAddress {
    fn eq(&self, other: &StoredAddress) -> bool {
        self.loc.weak_eq(&other.loc)
    }
}

impl Eq for StoredAddress {}

impl PartialOrd for StoredAddress {
    fn partial_cmp(&self, other: &StoredAddress) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoredAddress {
    fn cmp(&self, other: &StoredAddress) -> Ordering {
        let lhs = (self.loc.context.site_id(), &self.loc.base, &self.loc.offset);
        let rhs = (
            other.loc.context.site_id(),
            &other.loc.base,
            &other.loc.offset,
        );
        match lhs.cmp(&rhs) {
            Ordering::Equal => {}
            strict => return strict,
        }
        if self.loc.context.weak_eq(&other.loc.context) {
            return Ordering::Equal;
        }
        self.loc
            .context
            .call_history
            .cmp(&other.loc.context.call_history)
    }
}

impl Display for StoredAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(&self.loc, f)
    }
}
