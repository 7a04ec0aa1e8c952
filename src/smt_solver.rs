// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::ExprRef;

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// The result of asking the solver whether a query is valid in the current
/// constraint context.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Validity {
    /// The query holds in every model of the context.
    Valid,
    /// There is a model of the context falsifying the query.
    Invalid,
    /// The solver timed out or could not decide. Callers treat this the same
    /// as `Invalid` for subsumption purposes.
    Unknown,
}

/// The functionality a solver backend must expose for subsumption checking.
/// The backend itself (Z3 or otherwise) lives outside this crate; the tree
/// only ever talks to this trait. Backends must be debug-printable so solver
/// arguments show up in method traces.
pub trait SmtSolver: Debug {
    /// Decides the validity of `query` under the given constraint context.
    /// This is the standard path and may use whatever caching or
    /// pre-processing the backend has.
    fn evaluate(&mut self, constraints: &[ExprRef], query: &ExprRef) -> Validity;

    /// Decides validity on a fresh context without any pre-processing. Used
    /// for existentially quantified queries, which pre-solving pipelines
    /// generally cannot handle.
    fn direct_compute_validity(&mut self, constraints: &[ExprRef], query: &ExprRef) -> Validity;

    /// The minimal unsatisfiable subset of the context constraints from the
    /// most recent `Valid` answer.
    fn get_unsat_core(&self) -> Vec<ExprRef>;

    /// Sets the wall-clock budget for subsequent queries, in seconds. Zero
    /// removes the limit.
    fn set_timeout(&mut self, seconds: f64);
}

/// A solver that cannot decide anything, for configurations where a real
/// backend is not available or required. Every query answers `Unknown`, so
/// no state is ever subsumed.
#[derive(Debug, Default)]
pub struct SolverStub {}

impl SmtSolver for SolverStub {
    fn evaluate(&mut self, _constraints: &[ExprRef], _query: &ExprRef) -> Validity {
        Validity::Unknown
    }

    fn direct_compute_validity(&mut self, _constraints: &[ExprRef], _query: &ExprRef) -> Validity {
        Validity::Unknown
    }

    fn get_unsat_core(&self) -> Vec<ExprRef> {
        Vec::new()
    }

    fn set_timeout(&mut self, _seconds: f64) {}
}
