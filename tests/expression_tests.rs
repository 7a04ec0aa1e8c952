// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeSet;
use std::rc::Rc;

use txtree::expression::{substitute, Array, Expression, ExpressionKind, ExprRef};
use txtree::shadow_array::ShadowArrays;
use txtree::subsumption::SubsumptionTableEntry;

fn symbolic(name: &str) -> (Rc<Array>, ExprRef) {
    let array = Array::new(name, 32, 64);
    let read = Expression::read(array.clone(), Expression::constant(0, 32));
    (array, read)
}

fn const64(value: u64) -> ExprRef {
    Expression::constant(value, 64)
}

#[test]
fn rebuild_preserves_structure() {
    let (_, x) = symbolic("x");
    let exprs = vec![
        Expression::add(x.clone(), const64(3)),
        Expression::ult(x.clone(), const64(10)),
        Expression::select(
            Expression::eq(x.clone(), const64(1)),
            const64(2),
            const64(3),
        ),
        Expression::extract(x.clone(), 8, 16),
        Expression::zext(Expression::constant(1, 8), 64),
        Expression::not(Expression::eq(x.clone(), const64(0))),
        Expression::concat(Expression::constant(1, 32), Expression::constant(2, 32)),
    ];
    for expr in exprs {
        let rebuilt = expr.rebuild(&expr.kids());
        assert_eq!(rebuilt, expr);
        assert_eq!(rebuilt.width(), expr.width());
        assert_eq!(rebuilt.kind(), expr.kind());
    }
}

#[test]
fn widths_follow_kinds() {
    let (_, x) = symbolic("x");
    assert_eq!(x.width(), 64);
    assert_eq!(Expression::eq(x.clone(), const64(0)).width(), 1);
    assert_eq!(Expression::add(x.clone(), const64(1)).width(), 64);
    assert_eq!(
        Expression::concat(Expression::constant(0, 8), Expression::constant(0, 24)).width(),
        32
    );
    assert_eq!(Expression::extract(x.clone(), 0, 8).width(), 8);
    assert!(Expression::bool_true().is_true());
    assert!(Expression::bool_false().is_false());
    assert_eq!(Expression::bool_true().as_bool_if_known(), Some(true));
    assert_eq!(x.as_bool_if_known(), None);
}

#[test]
fn substitute_rewrites_every_occurrence() {
    let (_, x) = symbolic("x");
    let (_, y) = symbolic("y");
    let expr = Expression::and(
        Expression::ult(x.clone(), const64(10)),
        Expression::eq(Expression::add(x.clone(), const64(1)), const64(5)),
    );
    let rewritten = substitute(&expr, &x, &y);
    assert!(!rewritten.contains(&x));
    assert!(rewritten.contains(&y));
    assert_eq!(rewritten.kind(), ExpressionKind::And);
    // Untouched expressions are returned unchanged.
    let unchanged = substitute(&expr, &y, &x);
    assert_eq!(unchanged, expr);
}

#[test]
fn extract_arrays_collects_every_read() {
    let (ax, x) = symbolic("x");
    let (ay, y) = symbolic("y");
    let expr = Expression::or(
        Expression::ult(x.clone(), y.clone()),
        Expression::eq(x, const64(0)),
    );
    let mut arrays = BTreeSet::new();
    expr.extract_arrays(&mut arrays);
    assert_eq!(arrays.len(), 2);
    assert!(arrays.contains(&ax));
    assert!(arrays.contains(&ay));
}

#[test]
fn shadow_renaming_rewrites_reads() {
    let (array, read) = symbolic("a");
    let mut shadows = ShadowArrays::new();
    let shadow = shadows.register(&array);
    assert_eq!(&*shadow.name, "a__shadow");
    // Registration is idempotent and invertible.
    assert_eq!(shadows.register(&array), shadow);
    assert_eq!(shadows.original(&shadow), Some(array.clone()));
    assert!(shadows.is_shadow(&shadow));

    let constraint = Expression::eq(read, const64(3));
    let mut replacements = Vec::new();
    let shadowed = shadows.get_shadow_expression(&constraint, &mut replacements);
    let expected = Expression::eq(
        Expression::read(shadow.clone(), Expression::constant(0, 32)),
        const64(3),
    );
    assert_eq!(shadowed, expected);
    assert_eq!(replacements, vec![shadow.clone()]);

    // Shadowing the same constraint again does not duplicate the
    // replacement entry.
    let again = shadows.get_shadow_expression(&constraint, &mut replacements);
    assert_eq!(again, expected);
    assert_eq!(replacements.len(), 1);
}

#[test]
#[should_panic(expected = "no shadow registered")]
fn shadowing_an_unregistered_array_is_fatal() {
    let (_, read) = symbolic("never_registered");
    let shadows = ShadowArrays::new();
    let mut replacements = Vec::new();
    shadows.get_shadow_expression(&read, &mut replacements);
}

#[test]
fn equality_simplification_distributes_over_conjunction() {
    let (_, x) = symbolic("x");
    let (_, y) = symbolic("y");
    let p = Expression::eq(x.clone(), const64(1));
    let q = Expression::eq(y.clone(), const64(2));
    let conjunction = Expression::and(p.clone(), q.clone());

    let mut pack = Vec::new();
    let simplified = SubsumptionTableEntry::simplify_equality_expr(&mut pack, &conjunction);

    let mut pack_p = Vec::new();
    let simplified_p = SubsumptionTableEntry::simplify_equality_expr(&mut pack_p, &p);
    let mut pack_q = Vec::new();
    let simplified_q = SubsumptionTableEntry::simplify_equality_expr(&mut pack_q, &q);

    assert_eq!(simplified, Expression::and(simplified_p, simplified_q));
    assert_eq!(pack, vec![p, q]);
}

#[test]
fn equality_simplification_folds_constants() {
    let mut pack = Vec::new();
    let equal = Expression::eq(const64(2), const64(2));
    assert!(SubsumptionTableEntry::simplify_equality_expr(&mut pack, &equal).is_true());
    let unequal = Expression::eq(const64(2), const64(4));
    assert!(SubsumptionTableEntry::simplify_equality_expr(&mut pack, &unequal).is_false());
    assert!(pack.is_empty());

    // A false conjunct collapses the conjunction.
    let (_, x) = symbolic("x");
    let conjunction = Expression::and(Expression::eq(x, const64(1)), unequal);
    assert!(SubsumptionTableEntry::simplify_equality_expr(&mut pack, &conjunction).is_false());
}

#[test]
fn interpolant_simplification_negates_eq_false_comparisons() {
    let (_, x) = symbolic("x");
    let cmp = Expression::slt(x.clone(), const64(0));
    let negated = Expression::eq(Expression::bool_false(), cmp);
    let mut pack = Vec::new();
    let simplified = SubsumptionTableEntry::simplify_interpolant_expr(&mut pack, &negated);
    assert_eq!(simplified, Expression::sge(x, const64(0)));
    assert_eq!(pack, vec![simplified]);
}

#[test]
fn exists_is_dropped_when_existentials_vanish() {
    // Exists({a__shadow}, I /\ (a__shadow[0] = 5)) where I does not mention
    // a__shadow: the simplified result must not be quantified and must retain
    // the interpolant.
    let (array, _) = symbolic("a");
    let (_, x) = symbolic("x");
    let mut shadows = ShadowArrays::new();
    let shadow = shadows.register(&array);
    let shadow_read = Expression::read(shadow.clone(), Expression::constant(0, 32));

    let interpolant = Expression::ult(x, const64(10));
    let body = Expression::and(
        interpolant.clone(),
        Expression::eq(shadow_read, const64(5)),
    );
    let exists = Expression::exists(vec![shadow], body);

    let simplified = SubsumptionTableEntry::simplify_exists_expr(&exists);
    assert_ne!(simplified.kind(), ExpressionKind::Exists);
    assert!(simplified.contains(&interpolant));
}

#[test]
fn exists_simplification_substitutes_equalities() {
    // Interpolant atom (a__shadow[0] < 10) with equality (a__shadow[0] = x):
    // the substitution rewrites the atom over x and drops the quantifier.
    let (array, _) = symbolic("a");
    let (_, x) = symbolic("x");
    let mut shadows = ShadowArrays::new();
    let shadow = shadows.register(&array);
    let shadow_read = Expression::read(shadow.clone(), Expression::constant(0, 32));

    let atom = Expression::ult(shadow_read.clone(), const64(10));
    let equality = Expression::eq(shadow_read, x.clone());
    let exists = Expression::exists(vec![shadow], Expression::and(atom, equality));

    let simplified = SubsumptionTableEntry::simplify_exists_expr(&exists);
    assert_eq!(simplified, Expression::ult(x, const64(10)));
}

#[test]
fn exists_with_disjunctive_equality_is_left_unchanged() {
    let (array, _) = symbolic("a");
    let mut shadows = ShadowArrays::new();
    let shadow = shadows.register(&array);
    let shadow_read = Expression::read(shadow.clone(), Expression::constant(0, 32));

    let disjunction = Expression::or(
        Expression::eq(shadow_read.clone(), const64(1)),
        Expression::eq(shadow_read.clone(), const64(2)),
    );
    let body = Expression::and(Expression::ult(shadow_read, const64(10)), disjunction);
    let exists = Expression::exists(vec![shadow], body);

    let simplified = SubsumptionTableEntry::simplify_exists_expr(&exists);
    assert_eq!(simplified, exists);
}

#[test]
fn replace_expr_preserves_kind() {
    let (_, x) = symbolic("x");
    let (_, y) = symbolic("y");
    let original = Expression::add(x.clone(), const64(4));
    let replaced = SubsumptionTableEntry::replace_expr(&original, &x, &y);
    assert_eq!(replaced, Expression::add(y, const64(4)));
    assert_eq!(replaced.kind(), ExpressionKind::Add);
}
