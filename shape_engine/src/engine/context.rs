// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::cell::Cell;

use crate::heap::Heap;

/// # Scope in which the heap must not allocate
///
/// Holding this scope borrows the heap immutably, so no allocating shape
/// operation can be called while it is alive. In debug builds the heap also
/// counts the open scopes and asserts that none is open when memory is
/// allocated, which catches scopes that were leaked or smuggled out.
///
/// Shape reads that walk the raw ancestor chain open one for their whole
/// walk.
#[must_use]
#[derive(Debug)]
pub struct NoAllocScope<'h> {
    depth: &'h Cell<u32>,
}

impl<'h> NoAllocScope<'h> {
    pub fn new(heap: &'h Heap) -> Self {
        let depth = heap.no_alloc_depth();
        depth.set(depth.get() + 1);
        Self { depth }
    }

    /// Returns true if any scope is currently open on the heap.
    pub fn is_active(heap: &Heap) -> bool {
        heap.no_alloc_depth().get() > 0
    }
}

impl Drop for NoAllocScope<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}
