// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal model of the garbage collected heap that shapes live in.
//!
//! Shapes are stored in an arena vector and addressed by
//! [`ObjectShape`] handles. Slots of collected shapes are reused by later
//! allocations, but a live shape never moves: handles stay valid for as long
//! as the shape is reachable from the roots passed to the collector.

mod cell_kind;
mod heap_bits;
pub mod heap_gc;
#[cfg(feature = "heap-snapshot")]
mod snapshot;

use core::{cell::Cell, mem::size_of};
use std::ops::{Index, IndexMut};

pub use cell_kind::{CellKind, CellStatistics, HeapStatistics};
pub(crate) use heap_bits::{HeapBits, HeapMarkAndSweep, HeapSweepWeakReference, WorkQueues};
#[cfg(feature = "heap-snapshot")]
pub use snapshot::{HeapSnapshot, NodeId, RecordingSnapshot, SnapshotEdge, SnapshotNode};

use crate::{
    error::{AllocResult, AllocationError},
    execution::Options,
    shape::{ObjectShape, ShapeRecord},
};

/// Weakly held heap reference.
///
/// A weak reference does not keep its target alive. Once the target has been
/// collected, [`resolve`](WeakReference::resolve) returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct WeakReference<T>(pub(crate) T);

impl WeakReference<ObjectShape> {
    pub fn new(shape: ObjectShape) -> Self {
        Self(shape)
    }

    /// Get the target shape if it is still alive.
    ///
    /// > NOTE: A collected shape's slot may be reused by a later allocation,
    /// > so a weak reference must not be kept across a collection that did
    /// > not sweep it.
    pub fn resolve(self, heap: &Heap) -> Option<ObjectShape> {
        heap.is_live(self.0).then_some(self.0)
    }
}

pub(crate) trait CreateHeapData<T, F> {
    /// Store the given data in a new heap cell. The cell's memory must have
    /// been accounted for with [`Heap::allocate`] already.
    fn create(&mut self, data: T) -> AllocResult<F>;
}

#[derive(Debug)]
pub struct Heap {
    pub(crate) shapes: Vec<Option<ShapeRecord>>,
    /// Indexes of collected shape slots, reused last-in first-out.
    free_list: Vec<u32>,
    /// Bytes owned by live cells as of the last collection, plus everything
    /// allocated since.
    live_bytes: usize,
    /// Bytes allocated since the last collection.
    allocated_since_gc: usize,
    limit: Option<usize>,
    gc_threshold: usize,
    disable_gc: bool,
    no_alloc_depth: Cell<u32>,
}

impl Heap {
    pub fn new(options: &Options) -> Self {
        Self {
            shapes: Vec::with_capacity(256),
            free_list: Vec::new(),
            live_bytes: 0,
            allocated_since_gc: 0,
            limit: options.heap_limit,
            gc_threshold: options.gc_threshold,
            disable_gc: options.disable_gc,
            no_alloc_depth: Cell::new(0),
        }
    }

    /// Account for `bytes` of new heap memory.
    ///
    /// Fails without side effects if the heap limit would be exceeded.
    pub(crate) fn allocate(&mut self, bytes: usize) -> AllocResult<()> {
        debug_assert_eq!(
            self.no_alloc_depth.get(),
            0,
            "Heap allocation inside a NoAllocScope"
        );
        let total = self.live_bytes.saturating_add(bytes);
        if let Some(limit) = self.limit
            && total > limit
        {
            log::debug!(
                "Heap limit reached: {bytes} bytes requested with {} of {limit} bytes in use",
                self.live_bytes
            );
            return Err(AllocationError::OutOfMemory {
                requested: bytes,
                limit: Some(limit),
            });
        }
        self.live_bytes = total;
        self.allocated_since_gc = self.allocated_since_gc.saturating_add(bytes);
        Ok(())
    }

    /// Replace `charged` bytes, accounted for earlier by
    /// [`allocate`](Self::allocate) as an estimate, with the `actual` number
    /// of bytes the allocation took.
    pub(crate) fn settle(&mut self, charged: usize, actual: usize) {
        if charged != actual {
            log::trace!("Settling {charged} estimated bytes as {actual}");
        }
        self.live_bytes = self.live_bytes.saturating_sub(charged).saturating_add(actual);
        self.allocated_since_gc = self
            .allocated_since_gc
            .saturating_sub(charged)
            .saturating_add(actual);
    }

    /// Returns true if a collection should be performed at the next safe
    /// point.
    pub fn needs_gc(&self) -> bool {
        !self.disable_gc && self.allocated_since_gc >= self.gc_threshold
    }

    /// Returns true if the shape has not been collected.
    pub fn is_live(&self, shape: ObjectShape) -> bool {
        matches!(self.shapes.get(shape.get_index()), Some(Some(_)))
    }

    /// Number of live shapes.
    pub fn shape_count(&self) -> usize {
        self.shapes.len() - self.free_list.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn heap_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Change the heap limit. Cells already allocated are not affected.
    pub fn set_heap_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub(crate) fn no_alloc_depth(&self) -> &Cell<u32> {
        &self.no_alloc_depth
    }

    pub(crate) fn is_gc_disabled(&self) -> bool {
        self.disable_gc
    }

    /// Free the slot of an unmarked shape.
    fn free_shape(&mut self, index: usize) -> Option<ShapeRecord> {
        let record = self.shapes[index].take()?;
        self.free_list.push(index as u32);
        Some(record)
    }

    fn reset_byte_counters(&mut self, live_bytes: usize) {
        self.live_bytes = live_bytes;
        self.allocated_since_gc = 0;
    }
}

impl CreateHeapData<ShapeRecord, ObjectShape> for Heap {
    fn create(&mut self, data: ShapeRecord) -> AllocResult<ObjectShape> {
        if let Some(index) = self.free_list.pop() {
            let index = index as usize;
            debug_assert!(self.shapes[index].is_none());
            self.shapes[index] = Some(data);
            return Ok(ObjectShape::from_index(index));
        }
        if self.shapes.len() >= u32::MAX as usize - 1 {
            return Err(AllocationError::OutOfMemory {
                requested: size_of::<ShapeRecord>(),
                limit: self.limit,
            });
        }
        self.shapes.try_reserve(1)?;
        self.shapes.push(Some(data));
        Ok(ObjectShape::last(&self.shapes))
    }
}

impl Index<ObjectShape> for Heap {
    type Output = ShapeRecord;

    fn index(&self, index: ObjectShape) -> &Self::Output {
        self.shapes
            .get(index.get_index())
            .expect("ObjectShape out of bounds")
            .as_ref()
            .expect("ObjectShape slot empty")
    }
}

impl IndexMut<ObjectShape> for Heap {
    fn index_mut(&mut self, index: ObjectShape) -> &mut Self::Output {
        self.shapes
            .get_mut(index.get_index())
            .expect("ObjectShape out of bounds")
            .as_mut()
            .expect("ObjectShape slot empty")
    }
}
