// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Well known external functions that are treated in special ways. The
/// interpreted program may call functions whose bodies are never tracked;
/// for this closed set the result shape (pointer or scalar, and what bound
/// to record) is deduced from the name alone.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialOrd, PartialEq, Hash, Ord)]
pub enum KnownNames {
    /// This is not a known name.
    None,
    /// `_Znwm`, C++ `operator new`.
    CxxNew,
    /// `_Znam`, C++ `operator new[]`.
    CxxNewArray,
    Malloc,
    Realloc,
    Calloc,
    Getenv,
    Getpagesize,
    Ioctl,
    CtypeBLoc,
    Puts,
    Fflush,
    Strcmp,
    Strncmp,
    ErrnoLocation,
    Geteuid,
    Syscall,
    Printf,
    Vprintf,
    Fchmodat,
    Fchownat,
    Powl,
    Gettimeofday,
    /// The `klee_get_value*` family of executor intrinsics.
    KleeGetValue,
    /// Mangled C++ iostream operations.
    StreamOperation,
}

impl KnownNames {
    /// True iff a call to this function produces a fresh heap or environment
    /// pointer, i.e. the result value gets a memory location of its own.
    pub fn returns_pointer(self) -> bool {
        use KnownNames::*;
        matches!(
            self,
            CxxNew
                | CxxNewArray
                | Malloc
                | Realloc
                | Calloc
                | Getenv
                | CtypeBLoc
                | ErrnoLocation
                | KleeGetValue
        )
    }

    /// True iff the pointer result addresses environment state outside any
    /// call frame, placing its location in the global store frame.
    pub fn returns_environment_pointer(self) -> bool {
        use KnownNames::*;
        matches!(self, Getenv | CtypeBLoc | ErrnoLocation)
    }
}

lazy_static! {
    static ref NAME_TABLE: HashMap<&'static str, KnownNames> = {
        use KnownNames::*;
        let mut table = HashMap::new();
        table.insert("_Znwm", CxxNew);
        table.insert("_Znam", CxxNewArray);
        table.insert("malloc", Malloc);
        table.insert("realloc", Realloc);
        table.insert("calloc", Calloc);
        table.insert("getenv", Getenv);
        table.insert("getpagesize", Getpagesize);
        table.insert("ioctl", Ioctl);
        table.insert("__ctype_b_loc", CtypeBLoc);
        table.insert("puts", Puts);
        table.insert("fflush", Fflush);
        table.insert("strcmp", Strcmp);
        table.insert("strncmp", Strncmp);
        table.insert("__errno_location", ErrnoLocation);
        table.insert("geteuid", Geteuid);
        table.insert("syscall", Syscall);
        table.insert("printf", Printf);
        table.insert("vprintf", Vprintf);
        table.insert("fchmodat", Fchmodat);
        table.insert("fchownat", Fchownat);
        table.insert("powl", Powl);
        table.insert("gettimeofday", Gettimeofday);
        table
    };
}

/// A run-lifetime cache from callee names to known names, so repeated calls
/// resolve without re-classifying the string.
#[derive(Debug, Default)]
pub struct KnownNamesCache {
    name_cache: HashMap<Rc<str>, KnownNames>,
}

impl KnownNamesCache {
    pub fn new() -> KnownNamesCache {
        KnownNamesCache::default()
    }

    /// Gets the well known name for the given callee and caches the
    /// association. Returns `KnownNames::None` for names outside the
    /// recognised set.
    pub fn get(&mut self, name: &Rc<str>) -> KnownNames {
        if let Some(known) = self.name_cache.get(name) {
            return *known;
        }
        let known = Self::classify(name);
        self.name_cache.insert(name.clone(), known);
        known
    }

    fn classify(name: &str) -> KnownNames {
        if let Some(known) = NAME_TABLE.get(name) {
            return *known;
        }
        if name.starts_with("klee_get_value") {
            return KnownNames::KleeGetValue;
        }
        // Mangled stream operations: operator<< / operator>> and their
        // iostream method cousins all begin with these prefixes.
        if name.starts_with("_ZNSo") || name.starts_with("_ZNSi") || name.starts_with("_ZNSt") {
            return KnownNames::StreamOperation;
        }
        KnownNames::None
    }
}
