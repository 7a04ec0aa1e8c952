// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Somewhat arbitrary constants used to limit things in the subsumption engine
// that may take too long or use too much memory.

/// The default wall-clock budget in seconds for one subsumption solver call.
pub const DEFAULT_SUBSUMPTION_TIMEOUT: f64 = 10.0;

/// Substituting equality atoms into interpolant atoms is quadratic in the
/// worst case; packs larger than this skip the substitution pass.
pub const MAX_SIMPLIFICATION_PACK_SIZE: usize = 256;

/// Bounds the tracked call history. Every call pushes a store frame, so
/// recursion deeper than this aborts the transfer instead of growing the
/// frame stack without limit.
pub const MAX_CALL_DEPTH: usize = 1024;
