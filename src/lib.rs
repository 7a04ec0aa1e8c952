// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//
// The core of an interpolation-based subsumption engine for symbolic
// execution. The tree shadows the executor's path tree; each node carries a
// path condition and a dependency tracker over a copy-on-write shadow store.
// When a subtree is fully explored it is summarised into a subsumption-table
// entry (a Craig-style interpolant plus store snapshots, existentially
// quantified over shadow arrays), and later visits to the same program point
// are pruned when an SMT solver proves their state weaker than an entry.
//
// The symbolic interpreter, the expression builder it uses and the solver
// backend are external collaborators: the interpreter drives the tree through
// the operations on `itree::ITree`, and solvers plug in behind the
// `smt_solver::SmtSolver` trait.

#[macro_use]
extern crate log;

pub mod dependency;
pub mod expression;
pub mod itree;
pub mod k_limits;
pub mod known_names;
pub mod memory_location;
pub mod options;
pub mod path_condition;
pub mod program;
pub mod search_graph;
pub mod shadow_array;
pub mod smt_solver;
pub mod store_frame;
pub mod subsumption;
pub mod utils;
pub mod versioned_value;
