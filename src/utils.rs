// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::time::{Duration, Instant};

/// A wall-clock accumulator for method running-time statistics. Nested starts
/// are tolerated: only the outermost start/end pair is measured.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeStat {
    amount: Duration,
    started: Option<Instant>,
}

impl TimeStat {
    pub fn new() -> TimeStat {
        TimeStat::default()
    }

    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            self.amount += started.elapsed();
        }
    }

    /// The accumulated time in seconds.
    pub fn get(&self) -> f64 {
        self.amount.as_secs_f64()
    }

    /// Runs `f` inside a start/end pair.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        self.start();
        let result = f();
        self.end();
        result
    }
}
