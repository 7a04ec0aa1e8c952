// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::dependency::{ConcreteStore, Dependency, SymbolicStore};
use crate::expression::{Array, ExprRef, Expression, ExpressionKind};
use crate::path_condition::PathConditionMarker;
use crate::program::{ExecutionState, InstrId};
use crate::shadow_array::ShadowArrays;
use crate::smt_solver::{SmtSolver, Validity};
use crate::utils::TimeStat;
use crate::versioned_value::StoredValue;

use itertools::Itertools;
use log::{debug, trace};
use log_derive::logfn_inputs;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::rc::Rc;
use thiserror::Error;

/// Counters and timers for the subsumption decision procedure, owned by the
/// tree and shared by every entry.
#[derive(Debug, Default)]
pub struct SubsumptionStats {
    /// The number of solver calls made for subsumption checks.
    pub check_solver_count: u64,
    /// The number of those calls that failed to establish validity.
    pub check_solver_failure_count: u64,
    /// Wall-clock time spent inside the solver during subsumption checks.
    pub actual_solver_call_time: TimeStat,
}

#[derive(Debug, Error)]
pub enum WpUpdateError {
    /// The general update algorithm over a symbolically addressed store is
    /// not implemented; the caller must not attempt it.
    #[error("weakest-precondition update requires an empty symbolically addressed store")]
    NonEmptySymbolicStore,
}

/// A generalised state descriptor: the summary of a fully explored subtree,
/// indexed by program point in the subsumption table. A later visit to the
/// same program point is pruned when its state is weaker than the recorded
/// interpolant together with the store snapshots.
pub struct SubsumptionTableEntry {
    program_point: u64,
    interpolant: Option<ExprRef>,
    /// Per allocation site with exactly one concretely addressed binding, the
    /// stored value. Subsumption requires equality (or a bounds check, for
    /// pointers) against the candidate state's value at the same site.
    singleton_store: BTreeMap<InstrId, Rc<StoredValue>>,
    /// Sites with several possible bindings; the candidate state must match
    /// at least one of them.
    composite_store: BTreeMap<InstrId, Vec<Rc<StoredValue>>>,
    /// The shadow arrays the interpolant and store snapshots quantify over.
    existentials: Vec<Rc<Array>>,
    concretely_addressed_store: ConcreteStore,
    symbolically_addressed_store: SymbolicStore,
    /// A weakest-precondition formula computed along the subtree's trace,
    /// used by the optional refinement path.
    wp_interpolant: Option<ExprRef>,
}

impl SubsumptionTableEntry {
    pub fn new(
        program_point: u64,
        interpolant: Option<ExprRef>,
        concretely_addressed_store: ConcreteStore,
        symbolically_addressed_store: SymbolicStore,
        existentials: Vec<Rc<Array>>,
    ) -> SubsumptionTableEntry {
        let mut singleton_store = BTreeMap::new();
        let mut composite_store: BTreeMap<InstrId, Vec<Rc<StoredValue>>> = BTreeMap::new();
        for (site, bindings) in &concretely_addressed_store {
            if bindings.len() == 1 {
                let value = bindings.values().next().cloned();
                if let Some(value) = value {
                    singleton_store.insert(*site, value);
                }
            } else {
                composite_store
                    .entry(*site)
                    .or_default()
                    .extend(bindings.values().cloned());
            }
        }
        for (site, bindings) in &symbolically_addressed_store {
            composite_store
                .entry(*site)
                .or_default()
                .extend(bindings.iter().map(|(_, value)| value.clone()));
        }
        SubsumptionTableEntry {
            program_point,
            interpolant,
            singleton_store,
            composite_store,
            existentials,
            concretely_addressed_store,
            symbolically_addressed_store,
            wp_interpolant: None,
        }
    }

    pub fn program_point(&self) -> u64 {
        self.program_point
    }

    pub fn interpolant(&self) -> Option<&ExprRef> {
        self.interpolant.as_ref()
    }

    pub fn existentials(&self) -> &[Rc<Array>] {
        &self.existentials
    }

    pub fn concretely_addressed_store(&self) -> &ConcreteStore {
        &self.concretely_addressed_store
    }

    pub fn wp_interpolant(&self) -> Option<&ExprRef> {
        self.wp_interpolant.as_ref()
    }

    pub fn set_wp_interpolant(&mut self, wp: ExprRef) {
        self.wp_interpolant = Some(wp);
    }

    /// A trivially empty entry subsumes everything at its program point.
    fn empty(&self) -> bool {
        self.interpolant.is_none()
            && self.singleton_store.is_empty()
            && self.composite_store.is_empty()
    }

    /// Decides whether the candidate state is subsumed by this entry: the
    /// interpolant conjoined with store equalities must be valid in the
    /// state's constraint context. On success the constraints the
    /// unsatisfiability core used are promoted into the current node's
    /// interpolant through the marker map.
    #[allow(clippy::too_many_arguments)]
    #[logfn_inputs(TRACE)]
    pub fn subsumed(
        &self,
        solver: &mut dyn SmtSolver,
        state: &ExecutionState,
        dependency: &Dependency,
        marker_map: &HashMap<ExprRef, Rc<PathConditionMarker>>,
        shadow: &ShadowArrays,
        stats: &mut SubsumptionStats,
        timeout: f64,
    ) -> bool {
        // Check that we are at the right program point.
        if state.pc.instruction.0 != self.program_point {
            return false;
        }

        // Quick check for subsumption in case the interpolant is empty.
        if self.empty() {
            return true;
        }

        let mut dummy_replacements = Vec::new();
        let (state_concrete, state_symbolic) = dependency.get_stored_expressions(
            &state.call_history,
            shadow,
            &mut dummy_replacements,
            false,
            false,
        );
        let (state_singleton, state_composite) =
            Self::collapse_state_store(&state_concrete, &state_symbolic);

        let mut store_constraints: Option<ExprRef> = None;
        let mut conjoin = |constraint: ExprRef| {
            store_constraints = Some(match store_constraints.take() {
                Some(acc) => Expression::and(constraint, acc),
                None => constraint,
            });
        };

        for (site, entry_value) in &self.singleton_store {
            let state_value = match state_singleton.get(site) {
                Some(value) => value,
                // The current state does not constrain the same allocation.
                None => return false,
            };
            if entry_value.is_pointer() && entry_value.use_bound() {
                let check = entry_value.get_bounds_check(state_value);
                if check.is_false() {
                    return false;
                }
                if !check.is_true() {
                    conjoin(check);
                }
            } else {
                conjoin(Expression::eq(
                    entry_value.expression().clone(),
                    state_value.expression().clone(),
                ));
            }
        }

        for (site, entry_values) in &self.composite_store {
            let state_values = match state_composite.get(site) {
                Some(values) if !values.is_empty() => values,
                _ => return false,
            };
            let mut disjuncts: Option<ExprRef> = None;
            for (entry_value, state_value) in
                entry_values.iter().cartesian_product(state_values.iter())
            {
                let equality = Expression::eq(
                    entry_value.expression().clone(),
                    state_value.expression().clone(),
                );
                disjuncts = Some(match disjuncts {
                    Some(acc) => Expression::or(equality, acc),
                    None => equality,
                });
            }
            if let Some(disjuncts) = disjuncts {
                conjoin(disjuncts);
            }
        }

        // Build the query: always a conjunction of the interpolant and the
        // state equality constraints.
        let mut query = match (&self.interpolant, store_constraints) {
            (Some(interpolant), Some(constraints)) => {
                Expression::and(interpolant.clone(), constraints)
            }
            (Some(interpolant), None) => {
                Expression::and(interpolant.clone(), Expression::bool_true())
            }
            (None, Some(constraints)) => Expression::and(Expression::bool_true(), constraints),
            // Both the interpolant and the state equality constraints are
            // empty, therefore everything gets subsumed.
            (None, None) => return true,
        };

        if !self.existentials.is_empty() {
            let exists = Expression::exists(self.existentials.clone(), query);
            query = Self::simplify_exists_expr(&exists);
        }

        if let Some(known) = query.as_bool_if_known() {
            return known;
        }

        stats.check_solver_count += 1;
        trace!("querying for subsumption check: {}", query);

        let result = if matches!(query.kind(), ExpressionKind::Exists) {
            // An existentially quantified query cannot go through the
            // executor's pre-solving pipeline; use a fresh context.
            solver.set_timeout(timeout);
            let result = stats
                .actual_solver_call_time
                .measure(|| solver.direct_compute_validity(&state.constraints, &query));
            solver.set_timeout(0.0);
            result
        } else {
            solver.set_timeout(timeout);
            let result = stats
                .actual_solver_call_time
                .measure(|| solver.evaluate(&state.constraints, &query));
            solver.set_timeout(0.0);
            result
        };

        if result != Validity::Valid {
            // The solver could not decide that the subsumption is valid; it
            // may have timed out or decided invalidity.
            stats.check_solver_failure_count += 1;
            return false;
        }

        debug!("solver decided validity at program point {}", self.program_point);

        for constraint in solver.get_unsat_core() {
            // Some constraints may not be in the path condition because
            // constraints are not properly added at state merge; those are
            // skipped.
            if let Some(marker) = marker_map.get(&constraint) {
                marker.may_include_in_interpolant();
            }
        }

        // State subsumed: promote the used markers, which marks the needed
        // constraints and their dependencies on the path condition.
        let mut promoted = BTreeSet::new();
        for marker in marker_map.values() {
            let key = Rc::as_ptr(marker) as usize;
            if promoted.insert(key) {
                marker.include_in_interpolant(dependency);
            }
        }
        true
    }

    /// Collapses a state store pair into singleton/composite views matching
    /// the shape of the entry's stores.
    fn collapse_state_store(
        concrete: &ConcreteStore,
        symbolic: &SymbolicStore,
    ) -> (
        BTreeMap<InstrId, Rc<StoredValue>>,
        BTreeMap<InstrId, Vec<Rc<StoredValue>>>,
    ) {
        let mut singleton = BTreeMap::new();
        let mut composite: BTreeMap<InstrId, Vec<Rc<StoredValue>>> = BTreeMap::new();
        for (site, bindings) in concrete {
            if bindings.len() == 1 {
                if let Some(value) = bindings.values().next() {
                    singleton.insert(*site, value.clone());
                    composite
                        .entry(*site)
                        .or_default()
                        .push(value.clone());
                }
            } else {
                composite
                    .entry(*site)
                    .or_default()
                    .extend(bindings.values().cloned());
            }
        }
        for (site, bindings) in symbolic {
            composite
                .entry(*site)
                .or_default()
                .extend(bindings.iter().map(|(_, value)| value.clone()));
        }
        (singleton, composite)
    }

    // --- existential simplification --------------------------------------

    /// True iff `expr` reads any of the given existential arrays.
    fn has_existentials(existentials: &[Rc<Array>], expr: &ExprRef) -> bool {
        let set: BTreeSet<Rc<Array>> = existentials.iter().cloned().collect();
        expr.references_any_array(&set)
    }

    /// Simplifies an existentially quantified subsumption query with a light
    /// substitution heuristic; this is not quantifier elimination. The body
    /// is assumed to be a conjunction of an interpolant part (over shadow
    /// variables) and an equality part (over both shadow and state
    /// variables); anything else is returned unchanged.
    #[logfn_inputs(TRACE)]
    pub fn simplify_exists_expr(exists_expr: &ExprRef) -> ExprRef {
        let (variables, body) = match &**exists_expr {
            Expression::Exists { variables, body } => (variables, body),
            _ => return exists_expr.clone(),
        };

        // We only simplify a conjunction of interpolant and equalities.
        let (interpolant_part, equality_part) = match &**body {
            Expression::And { left, right } => (left, right),
            _ => return exists_expr.clone(),
        };

        // The equality constraint is only a single disjunctive clause of a
        // CNF formula; in this case we simplify nothing.
        if matches!(equality_part.kind(), ExpressionKind::Or) {
            return exists_expr.clone();
        }

        // Reduce constant-vs-constant equalities to TRUE/FALSE and collect
        // the remaining atomic equalities for use in substitution.
        let mut equality_pack = Vec::new();
        let full_equality = Self::simplify_equality_expr(&mut equality_pack, equality_part);

        // If the simplified interpolant is a constant, the equalities contain
        // no shadow variables and can be returned on their own.
        let mut interpolant_pack = Vec::new();
        let simplified_interpolant =
            Self::simplify_interpolant_expr(&mut interpolant_pack, interpolant_part);
        if simplified_interpolant.is_constant() {
            return full_equality;
        }

        // The substitution below is quadratic in the pack sizes; give up on
        // pathological queries rather than stall the executor.
        if interpolant_pack.len().saturating_mul(equality_pack.len())
            > crate::k_limits::MAX_SIMPLIFICATION_PACK_SIZE
        {
            return exists_expr.clone();
        }

        let mut new_interpolant: Option<ExprRef> = None;
        for atom in &interpolant_pack {
            // For example, the atom is C cmp D.
            let mut atom = atom.clone();
            for equality in &equality_pack {
                if equality.is_false() {
                    return Expression::bool_false();
                }
                if equality.is_true() {
                    return Expression::bool_true();
                }
                // Say the equality constraint is A == B, with the shadow
                // expression always on the left side.
                let equality_left = &equality.kids()[0];
                let equality_right = &equality.kids()[1];
                let atom_kids = atom.kids();
                if atom_kids.len() < 2 {
                    continue;
                }
                if equality_left.contains(&atom_kids[0]) {
                    // Substitute: the new lhs is B; the new rhs is D when A
                    // is not compound, otherwise A[D/C].
                    let new_left = equality_right.clone();
                    let new_right = if equality_left.kids().len() < 2 {
                        atom_kids[1].clone()
                    } else {
                        Self::replace_expr(equality_left, &atom_kids[0], &atom_kids[1])
                    };
                    atom = Expression::binary_of_kind(atom.kind(), new_left, new_right);
                }
            }
            new_interpolant = Some(match new_interpolant {
                Some(acc) => Expression::and(acc, atom),
                None => atom,
            });
        }

        let new_body = match new_interpolant {
            Some(interpolant) => {
                if !Self::has_existentials(variables, &interpolant) {
                    return interpolant;
                }
                Expression::and(interpolant, full_equality)
            }
            None => Expression::and(simplified_interpolant, full_equality),
        };

        Self::simplify_with_fourier_motzkin(&exists_expr.rebuild(&[new_body]))
    }

    /// A placeholder for Fourier-Motzkin elimination; implementations may
    /// strengthen this, and the identity is allowed.
    fn simplify_with_fourier_motzkin(exists_expr: &ExprRef) -> ExprRef {
        exists_expr.clone()
    }

    /// Folds constant comparisons, rewrites `Eq(false, cmp)` into the negated
    /// comparison, and collects the atomic conjuncts of an interpolant into
    /// `interpolant_pack`.
    pub fn simplify_interpolant_expr(
        interpolant_pack: &mut Vec<ExprRef>,
        expr: &ExprRef,
    ) -> ExprRef {
        let kids = expr.kids();
        if kids.len() < 2 {
            return expr.clone();
        }

        match &**expr {
            Expression::Eq { left, right } if left.is_constant() && right.is_constant() => {
                return Expression::from_bool(left == right);
            }
            Expression::Ne { left, right } if left.is_constant() && right.is_constant() => {
                return Expression::from_bool(left != right);
            }
            Expression::And { left, right } => {
                return Expression::and(
                    Self::simplify_interpolant_expr(interpolant_pack, left),
                    Self::simplify_interpolant_expr(interpolant_pack, right),
                );
            }
            _ => {}
        }

        // If the expression has the form (Eq false P) where P is some
        // comparison, change it into the negation of P.
        let mut simplified = expr.clone();
        if let Expression::Eq { left, right } = &**expr {
            if left.is_false() {
                let cmp_kids = right.kids();
                if cmp_kids.len() == 2 {
                    simplified = match right.kind() {
                        ExpressionKind::Slt => {
                            Expression::sge(cmp_kids[0].clone(), cmp_kids[1].clone())
                        }
                        ExpressionKind::Sge => {
                            Expression::slt(cmp_kids[0].clone(), cmp_kids[1].clone())
                        }
                        ExpressionKind::Sle => {
                            Expression::sgt(cmp_kids[0].clone(), cmp_kids[1].clone())
                        }
                        ExpressionKind::Sgt => {
                            Expression::sle(cmp_kids[0].clone(), cmp_kids[1].clone())
                        }
                        _ => simplified,
                    };
                }
            }
        }

        if !interpolant_pack.contains(&simplified) {
            interpolant_pack.push(simplified.clone());
        }
        simplified
    }

    /// Reduces constant-vs-constant equalities to TRUE/FALSE, folds boolean
    /// structure, and collects the remaining atomic equalities of a
    /// conjunction into `equality_pack`. The atoms inside a disjunctive
    /// clause are not collected, as they cannot be used for substitution.
    pub fn simplify_equality_expr(equality_pack: &mut Vec<ExprRef>, expr: &ExprRef) -> ExprRef {
        let kids = expr.kids();
        if kids.len() < 2 {
            return expr.clone();
        }

        match &**expr {
            Expression::Eq { left, right } => {
                if left.is_constant() && right.is_constant() {
                    return Expression::from_bool(left == right);
                }
                if !equality_pack.contains(expr) {
                    equality_pack.push(expr.clone());
                }
                expr.clone()
            }
            Expression::And { left, right } => {
                let left = Self::simplify_equality_expr(equality_pack, left);
                if left.is_false() {
                    return left;
                }
                let right = Self::simplify_equality_expr(equality_pack, right);
                if right.is_false() {
                    return right;
                }
                if left.is_true() {
                    return right;
                }
                if right.is_true() {
                    return left;
                }
                Expression::and(left, right)
            }
            Expression::Or { left, right } => {
                // Throw-away packs: atomic equalities inside a disjunctive
                // clause do not simplify the interpolant.
                let mut dummy = Vec::new();
                let left = Self::simplify_equality_expr(&mut dummy, left);
                if left.is_true() {
                    return left;
                }
                let right = Self::simplify_equality_expr(&mut dummy, right);
                if right.is_true() {
                    return right;
                }
                if left.is_false() {
                    return right;
                }
                if right.is_false() {
                    return left;
                }
                Expression::or(left, right)
            }
            _ => {
                debug_assert!(false, "invalid expression type in equality constraint");
                expr.clone()
            }
        }
    }

    /// Replaces occurrences of `replaced` inside a two-kid expression with
    /// `substitute_expr`, preserving the kind at every level. Expressions
    /// that are not binary (or that are concatenations) are left alone.
    pub fn replace_expr(
        original: &ExprRef,
        replaced: &ExprRef,
        substitute_expr: &ExprRef,
    ) -> ExprRef {
        let kids = original.kids();
        if kids.len() != 2 || matches!(original.kind(), ExpressionKind::Concat) {
            return original.clone();
        }
        if &kids[0] == replaced {
            return Expression::binary_of_kind(
                original.kind(),
                substitute_expr.clone(),
                kids[1].clone(),
            );
        }
        if &kids[1] == replaced {
            return Expression::binary_of_kind(
                original.kind(),
                kids[0].clone(),
                substitute_expr.clone(),
            );
        }
        Expression::binary_of_kind(
            original.kind(),
            Self::replace_expr(&kids[0], replaced, substitute_expr),
            Self::replace_expr(&kids[1], replaced, substitute_expr),
        )
    }

    // --- weakest-precondition update -------------------------------------

    /// Refines this entry with its weakest-precondition interpolant: the
    /// arrays the WP formula re-grounds no longer need their shadows as
    /// existentials, and their concretely addressed store entries (matched by
    /// longest call history) are dropped, along with interpolant conjuncts
    /// over the removed shadows.
    ///
    /// The general algorithm over a non-empty symbolically addressed store is
    /// unimplemented; such entries abort the update.
    #[logfn_inputs(TRACE)]
    pub fn update_with_weakest_precondition(
        &mut self,
        shadow: &ShadowArrays,
    ) -> Result<(), WpUpdateError> {
        let wp = match &self.wp_interpolant {
            Some(wp) => wp.clone(),
            None => return Ok(()),
        };
        if !self.symbolically_addressed_store.is_empty() {
            return Err(WpUpdateError::NonEmptySymbolicStore);
        }

        // The shadows of the arrays the WP reads leave the existentials.
        let mut shadows = Vec::new();
        shadow.shadows_of_read_arrays(&wp, &mut shadows);
        self.existentials.retain(|array| !shadows.contains(array));

        // Remove the WP's arrays from the concretely addressed store: for
        // each, the entry with a value over that array and the longest call
        // history goes.
        let mut read_arrays = BTreeSet::new();
        wp.extract_arrays(&mut read_arrays);
        for array in &read_arrays {
            let mut candidate: Option<(InstrId, crate::memory_location::StoredAddress)> = None;
            let mut longest = 0usize;
            let mut mentions: BTreeSet<Rc<Array>> = BTreeSet::new();
            mentions.insert(array.clone());
            if let Some(shadowed) = shadow.shadow(array) {
                mentions.insert(shadowed);
            }
            for (site, bindings) in &self.concretely_addressed_store {
                for (address, value) in bindings {
                    if !value.expression().references_any_array(&mentions) {
                        continue;
                    }
                    let history_len = address.loc.context().call_history().len();
                    if candidate.is_none() || history_len >= longest {
                        longest = history_len;
                        candidate = Some((*site, address.clone()));
                    }
                }
            }
            if let Some((site, address)) = candidate {
                if let Some(bindings) = self.concretely_addressed_store.get_mut(&site) {
                    bindings.remove(&address);
                    if bindings.is_empty() {
                        self.concretely_addressed_store.remove(&site);
                    }
                }
            }
        }

        // Conjuncts of the interpolant over the removed shadows are gone too.
        if let Some(interpolant) = &self.interpolant {
            let removed: BTreeSet<Rc<Array>> = shadows.into_iter().collect();
            self.interpolant = Self::remove_conjuncts_referencing(interpolant, &removed);
        }
        Ok(())
    }

    /// Drops the conjuncts of `expr` that read any of the given arrays,
    /// returning `None` when nothing survives.
    fn remove_conjuncts_referencing(
        expr: &ExprRef,
        arrays: &BTreeSet<Rc<Array>>,
    ) -> Option<ExprRef> {
        if let Expression::And { left, right } = &**expr {
            let left = Self::remove_conjuncts_referencing(left, arrays);
            let right = Self::remove_conjuncts_referencing(right, arrays);
            return match (left, right) {
                (Some(left), Some(right)) => Some(Expression::and(left, right)),
                (Some(side), None) | (None, Some(side)) => Some(side),
                (None, None) => None,
            };
        }
        if expr.references_any_array(arrays) {
            None
        } else {
            Some(expr.clone())
        }
    }
}

impl Debug for SubsumptionTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(self, f)
    }
}

impl Display for SubsumptionTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "------------ Subsumption Table Entry ------------")?;
        writeln!(f, "Program point = {}", self.program_point)?;
        match &self.interpolant {
            Some(interpolant) => writeln!(f, "interpolant = {}", interpolant)?,
            None => writeln!(f, "interpolant = (empty)")?,
        }
        if !self.singleton_store.is_empty() {
            f.write_str("singleton allocations = [")?;
            for (i, (site, value)) in self.singleton_store.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "({},{})", site, value)?;
            }
            writeln!(f, "]")?;
        }
        if !self.composite_store.is_empty() {
            f.write_str("composite allocations = [")?;
            for (i, (site, values)) in self.composite_store.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "({},[", site)?;
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("])")?;
            }
            writeln!(f, "]")?;
        }
        if !self.existentials.is_empty() {
            f.write_str("existentials = [")?;
            for (i, array) in self.existentials.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", array)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}
