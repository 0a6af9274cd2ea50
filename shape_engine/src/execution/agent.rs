// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::IdentifierTable;
use crate::{
    error::AllocResult,
    heap::{
        Heap,
        heap_gc::{self, GcStats},
    },
    shape::ObjectShape,
    types::SymbolId,
};

#[derive(Debug, Clone)]
pub struct Options {
    /// Number of properties at which a shape stops creating trie children
    /// and converts to dictionary mode instead.
    pub dictionary_threshold: u32,
    /// Move a cacheable dictionary to a fresh no-cache dictionary shape when
    /// the flags of one of its properties change.
    pub no_cache_on_dictionary_update: bool,
    /// Move a cacheable dictionary to a fresh no-cache dictionary shape when
    /// one of its properties is deleted.
    pub no_cache_on_dictionary_delete: bool,
    /// Maximum number of bytes the shape heap may use.
    pub heap_limit: Option<usize>,
    /// Number of allocated bytes after which [`Agent::needs_gc`] reports
    /// true.
    pub gc_threshold: usize,
    pub disable_gc: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dictionary_threshold: 64,
            no_cache_on_dictionary_update: true,
            no_cache_on_dictionary_delete: true,
            heap_limit: None,
            gc_threshold: 1024 * 1024,
            disable_gc: false,
        }
    }
}

/// Owner of the shape heap and the identifier table.
///
/// Every shape operation takes the agent: reads borrow it shared, anything
/// that may allocate borrows it exclusively. Garbage collection also needs
/// exclusive access, so it can never observe a shape operation half-way.
#[derive(Debug)]
pub struct Agent {
    pub heap: Heap,
    pub(crate) options: Options,
    pub(crate) identifiers: IdentifierTable,
    root_shape: ObjectShape,
}

impl Agent {
    pub fn new(options: Options) -> AllocResult<Self> {
        let mut heap = Heap::new(&options);
        let root_shape = ObjectShape::create_root_in(&mut heap)?;
        log::debug!("Created agent with {options:?}");
        Ok(Self {
            heap,
            options,
            identifiers: IdentifierTable::new(),
            root_shape,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The shared empty shape. It is always a garbage collection root.
    pub fn root_shape(&self) -> ObjectShape {
        self.root_shape
    }

    pub fn identifiers(&self) -> &IdentifierTable {
        &self.identifiers
    }

    /// Intern a property name.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        self.identifiers.intern(name)
    }

    /// Get the string behind an interned property name.
    pub fn name(&self, id: SymbolId) -> &str {
        self.identifiers.name(id)
    }

    /// Returns true if enough memory has been allocated since the last
    /// collection that the embedder should call [`gc`](Self::gc) at its next
    /// safe point.
    pub fn needs_gc(&self) -> bool {
        self.heap.needs_gc()
    }

    /// Collect every shape not reachable from `roots` or the root shape.
    ///
    /// Does nothing if garbage collection is disabled.
    pub fn gc(&mut self, roots: &[ObjectShape]) -> GcStats {
        if self.heap.is_gc_disabled() {
            log::trace!("Skipping garbage collection: disabled");
            return GcStats {
                marked: self.heap.shape_count(),
                freed: 0,
                live_bytes: self.heap.live_bytes(),
            };
        }
        let mut all_roots = Vec::with_capacity(roots.len() + 1);
        all_roots.push(self.root_shape);
        all_roots.extend_from_slice(roots);
        heap_gc::collect(&mut self.heap, &all_roots)
    }
}
