// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{Array, ExprRef, Expression};

use log_derive::logfn_inputs;
use std::collections::HashMap;
use std::rc::Rc;

/// The per-run registry of shadow arrays. Each original symbolic array the
/// executor introduces is paired with a freshly named shadow copy; reads of
/// the original are rewritten to reads of the shadow when a constraint is
/// lifted into an interpolant, and the shadows seen become the existential
/// variables of the enclosing `Exists`.
///
/// The registry is owned by the interpolation tree and threaded through the
/// API; it starts empty and only grows over a run.
#[derive(Debug, Default)]
pub struct ShadowArrays {
    shadow_of: HashMap<Rc<Array>, Rc<Array>>,
    original_of: HashMap<Rc<Array>, Rc<Array>>,
}

impl ShadowArrays {
    pub fn new() -> ShadowArrays {
        ShadowArrays::default()
    }

    /// Registers a shadow for `original`, creating it on first sight.
    /// Registration is idempotent: the same shadow is returned every time.
    #[logfn_inputs(TRACE)]
    pub fn register(&mut self, original: &Rc<Array>) -> Rc<Array> {
        if let Some(shadow) = self.shadow_of.get(original) {
            return shadow.clone();
        }
        let shadow = Array::new(
            &format!("{}__shadow", original.name),
            original.domain_width,
            original.range_width,
        );
        self.shadow_of.insert(original.clone(), shadow.clone());
        self.original_of.insert(shadow.clone(), original.clone());
        shadow
    }

    /// The shadow registered for `original`, if any.
    pub fn shadow(&self, original: &Rc<Array>) -> Option<Rc<Array>> {
        self.shadow_of.get(original).cloned()
    }

    /// The original an existing shadow was created for, if any.
    pub fn original(&self, shadow: &Rc<Array>) -> Option<Rc<Array>> {
        self.original_of.get(shadow).cloned()
    }

    /// True iff the given array is a registered shadow.
    pub fn is_shadow(&self, array: &Rc<Array>) -> bool {
        self.original_of.contains_key(array)
    }

    /// Rewrites every read of an original array into a read of its shadow,
    /// rebuilding the expression spine. Constants are identities; all other
    /// kinds are rebuilt recursively. Every shadow used is appended to
    /// `replacements` exactly once, in first-use order, so the caller can
    /// quantify over them.
    ///
    /// Panics when the expression reads an array that was never registered;
    /// by the time an interpolant is packed every array of the path condition
    /// must have a shadow, so a miss is an implementation bug.
    #[logfn_inputs(TRACE)]
    pub fn get_shadow_expression(
        &self,
        expr: &ExprRef,
        replacements: &mut Vec<Rc<Array>>,
    ) -> ExprRef {
        match &**expr {
            Expression::Constant { .. } => expr.clone(),
            Expression::Read { array, index } => {
                let shadow = self
                    .shadow_of
                    .get(array)
                    .unwrap_or_else(|| panic!("no shadow registered for array {}", array.name));
                if !replacements.contains(shadow) {
                    replacements.push(shadow.clone());
                }
                Expression::read(
                    shadow.clone(),
                    self.get_shadow_expression(index, replacements),
                )
            }
            _ => {
                let kids = expr.kids();
                let shadowed: Vec<ExprRef> = kids
                    .iter()
                    .map(|kid| self.get_shadow_expression(kid, replacements))
                    .collect();
                expr.rebuild(&shadowed)
            }
        }
    }

    /// Maps the shadows of every array read by `expr` into `shadows`,
    /// skipping arrays with no registration. Used by the weakest-precondition
    /// update to discover which existentials a formula re-grounds.
    pub fn shadows_of_read_arrays(
        &self,
        expr: &ExprRef,
        shadows: &mut Vec<Rc<Array>>,
    ) {
        let mut arrays = std::collections::BTreeSet::new();
        expr.extract_arrays(&mut arrays);
        for array in arrays {
            if let Some(shadow) = self.shadow_of.get(&array) {
                if !shadows.contains(shadow) {
                    shadows.push(shadow.clone());
                }
            }
        }
    }
}
