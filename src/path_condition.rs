// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::dependency::Dependency;
use crate::expression::{Array, ExprRef};
use crate::program::ValueId;
use crate::shadow_array::ShadowArrays;
use crate::versioned_value::VersionedValue;

use log_derive::logfn_inputs;
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

/// One constraint of the path condition, a cons cell of the per-node
/// constraint list. Lists grow by prepending at each conditional branch, and
/// the cells are shared between a node and its descendants up to the split
/// point.
///
/// The shadow-renamed form of the constraint is produced on demand, only when
/// the constraint is required in an interpolant.
pub struct PathCondition {
    constraint: ExprRef,
    shadow_constraint: RefCell<Option<ExprRef>>,
    shadowed: Cell<bool>,
    /// The versioned value the constraint was generated from, used to mark
    /// the constraint's dependencies when it joins the interpolant.
    condition: Option<Rc<VersionedValue>>,
    /// When true, the constraint should be included in the interpolant.
    in_interpolant: Cell<bool>,
    tail: Option<Rc<PathCondition>>,
}

impl PathCondition {
    pub fn new(
        constraint: ExprRef,
        dependency: &Dependency,
        condition: Option<ValueId>,
        prev: Option<Rc<PathCondition>>,
    ) -> Rc<PathCondition> {
        Rc::new(PathCondition {
            constraint,
            shadow_constraint: RefCell::new(None),
            shadowed: Cell::new(false),
            condition: condition.and_then(|id| dependency.latest_value(id)),
            in_interpolant: Cell::new(false),
            tail: prev,
        })
    }

    /// The constraint this cell carries.
    pub fn car(&self) -> &ExprRef {
        &self.constraint
    }

    /// The rest of the list.
    pub fn cdr(&self) -> Option<&Rc<PathCondition>> {
        self.tail.as_ref()
    }

    pub fn car_in_interpolant(&self) -> bool {
        self.in_interpolant.get()
    }

    /// Includes this constraint in the interpolant: all values the owning
    /// condition depends on are marked core, then the cell itself is flagged.
    #[logfn_inputs(TRACE)]
    pub fn include_in_interpolant(&self, dependency: &Dependency) {
        if let Some(condition) = &self.condition {
            dependency.mark_flow(condition, "in unsatisfiability core");
        }
        self.in_interpolant.set(true);
    }

    /// Folds every in-interpolant constraint of the list into a conjunction
    /// of their shadow-renamed forms, producing each shadow lazily and
    /// accumulating the shadow arrays used in `replacements`.
    pub fn pack_interpolant(
        self: &Rc<PathCondition>,
        shadow: &ShadowArrays,
        replacements: &mut Vec<Rc<Array>>,
    ) -> Option<ExprRef> {
        let mut result: Option<ExprRef> = None;
        let mut cell = Some(self);
        while let Some(pc) = cell {
            if pc.in_interpolant.get() {
                if !pc.shadowed.get() {
                    *pc.shadow_constraint.borrow_mut() =
                        Some(shadow.get_shadow_expression(&pc.constraint, replacements));
                    pc.shadowed.set(true);
                } else if let Some(existing) = pc.shadow_constraint.borrow().as_ref() {
                    // The shadow was produced by an earlier pack; its arrays
                    // must still join this pack's replacement list.
                    let mut arrays = std::collections::BTreeSet::new();
                    existing.extract_arrays(&mut arrays);
                    for array in arrays {
                        if shadow.is_shadow(&array) && !replacements.contains(&array) {
                            replacements.push(array);
                        }
                    }
                }
                let shadowed = pc
                    .shadow_constraint
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| pc.constraint.clone());
                result = Some(match result {
                    Some(acc) => crate::expression::Expression::and(acc, shadowed),
                    None => shadowed,
                });
            }
            cell = pc.tail.as_ref();
        }
        result
    }

    /// The number of cells in the list, which equals the number of
    /// conditional branches from the root to the owning node.
    pub fn len(self: &Rc<PathCondition>) -> usize {
        let mut count = 0;
        let mut cell = Some(self);
        while let Some(pc) = cell {
            count += 1;
            cell = pc.tail.as_ref();
        }
        count
    }

}

impl Display for PathCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str("[")?;
        let mut cell = Some(self);
        let mut first = true;
        while let Some(pc) = cell {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(
                f,
                "{}: {}",
                pc.constraint,
                if pc.in_interpolant.get() {
                    "interpolant constraint"
                } else {
                    "non-interpolant constraint"
                }
            )?;
            cell = pc.tail.as_deref();
        }
        f.write_str("]")
    }
}

impl Debug for PathCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

/// Records, during a subsumption check, which path-condition constraints the
/// unsatisfiability core used. Constraints are first marked as "may be in the
/// interpolant" while the query is still being decided, and only promoted to
/// the interpolant proper once the check succeeds.
#[derive(Debug)]
pub struct PathConditionMarker {
    may_be_in_interpolant: Cell<bool>,
    path_condition: Rc<PathCondition>,
}

impl PathConditionMarker {
    pub fn new(path_condition: Rc<PathCondition>) -> Rc<PathConditionMarker> {
        Rc::new(PathConditionMarker {
            may_be_in_interpolant: Cell::new(false),
            path_condition,
        })
    }

    pub fn may_include_in_interpolant(&self) {
        self.may_be_in_interpolant.set(true);
    }

    /// Promotes the marker: if the subsumption check used the constraint, it
    /// joins the interpolant with its dependencies.
    pub fn include_in_interpolant(&self, dependency: &Dependency) {
        if self.may_be_in_interpolant.get() {
            self.path_condition.include_in_interpolant(dependency);
        }
    }

    pub fn path_condition(&self) -> &Rc<PathCondition> {
        &self.path_condition
    }
}
