// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::memory_location::MemoryLocation;
use crate::program::InstrId;
use crate::versioned_value::VersionedValue;

use log_derive::logfn_inputs;
use rpds::HashTrieMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The pair a store maps a location to: the value that was used as the
/// address and the value that was stored through it.
pub type StoreEntry = (Rc<VersionedValue>, Rc<VersionedValue>);

/// One call frame of the shadow store: a pair of maps from memory locations
/// to stored values, one keyed by concretely addressed locations and one by
/// symbolically addressed ones.
///
/// The maps are persistent tries, so cloning a frame when the tree splits is
/// O(1) and sibling nodes share structure until one of them writes. This is
/// the copy-on-write inheritance the store relies on; there is no separate
/// source pointer to materialise.
#[derive(Clone)]
pub struct StoreFrame {
    /// The call site that pushed this frame; `None` for the bottom frame and
    /// the global frame.
    callsite: Option<InstrId>,
    /// Depth of this frame in the stack; the global frame has height 0.
    height: usize,
    concretely_addressed: HashTrieMap<Rc<MemoryLocation>, StoreEntry>,
    symbolically_addressed: HashTrieMap<Rc<MemoryLocation>, StoreEntry>,
}

impl StoreFrame {
    pub fn new(callsite: Option<InstrId>, height: usize) -> StoreFrame {
        StoreFrame {
            callsite,
            height,
            concretely_addressed: HashTrieMap::default(),
            symbolically_addressed: HashTrieMap::default(),
        }
    }

    pub fn callsite(&self) -> Option<InstrId> {
        self.callsite
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Newly relates a location with its stored value, routing the binding to
    /// the concretely or symbolically addressed map.
    #[logfn_inputs(TRACE)]
    pub fn update_store(
        &mut self,
        loc: Rc<MemoryLocation>,
        address: Rc<VersionedValue>,
        value: Rc<VersionedValue>,
    ) {
        if loc.has_constant_address() {
            self.concretely_addressed.insert_mut(loc, (address, value));
        } else {
            self.symbolically_addressed.insert_mut(loc, (address, value));
        }
    }

    /// Reads the entry stored at the given location. Symbolically addressed
    /// lookups compare the address expressions structurally.
    #[logfn_inputs(TRACE)]
    pub fn read(&self, address: &Rc<MemoryLocation>) -> Option<StoreEntry> {
        if address.has_constant_address() {
            self.concretely_addressed.get(address).cloned()
        } else {
            self.symbolically_addressed.get(address).cloned()
        }
    }

    pub fn concrete_entries(&self) -> impl Iterator<Item = (&Rc<MemoryLocation>, &StoreEntry)> {
        self.concretely_addressed.iter()
    }

    pub fn symbolic_entries(&self) -> impl Iterator<Item = (&Rc<MemoryLocation>, &StoreEntry)> {
        self.symbolically_addressed.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.concretely_addressed.is_empty() && self.symbolically_addressed.is_empty()
    }
}

impl Debug for StoreFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(
            f,
            "frame height {} callsite {:?}",
            self.height, self.callsite
        )?;
        if self.concretely_addressed.is_empty() {
            writeln!(f, "concrete store = []")?;
        } else {
            writeln!(f, "concrete store = [")?;
            for (loc, (_, value)) in self.concretely_addressed.iter() {
                writeln!(f, "  {} -> {}", loc, value)?;
            }
            writeln!(f, "]")?;
        }
        if self.symbolically_addressed.is_empty() {
            writeln!(f, "symbolic store = []")
        } else {
            writeln!(f, "symbolic store = [")?;
            for (loc, (_, value)) in self.symbolically_addressed.iter() {
                writeln!(f, "  {} -> {}", loc, value)?;
            }
            writeln!(f, "]")
        }
    }
}
