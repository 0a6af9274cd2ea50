// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::Heap;
use crate::shape::ObjectShape;

/// Mark bits of every heap cell, indexed like the heap vectors.
#[derive(Debug)]
pub(crate) struct HeapBits {
    pub(crate) shapes: Box<[bool]>,
}

impl HeapBits {
    pub(crate) fn new(heap: &Heap) -> Self {
        Self {
            shapes: vec![false; heap.shapes.len()].into_boxed_slice(),
        }
    }

    pub(crate) fn is_marked(&self, shape: ObjectShape) -> bool {
        self.shapes
            .get(shape.get_index())
            .copied()
            .unwrap_or(false)
    }

    pub(crate) fn marked_count(&self) -> usize {
        self.shapes.iter().filter(|marked| **marked).count()
    }
}

/// Cells discovered during marking whose contents have not been traced yet.
#[derive(Debug)]
pub(crate) struct WorkQueues {
    pub(crate) shapes: Vec<ObjectShape>,
}

impl WorkQueues {
    pub(crate) fn new(heap: &Heap) -> Self {
        Self {
            shapes: Vec::with_capacity(heap.shapes.len() / 4),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

pub(crate) trait HeapMarkAndSweep {
    /// Push every strongly held heap reference into the work queues.
    fn mark_values(&self, queues: &mut WorkQueues);

    /// Drop every weakly held heap reference that was not marked.
    fn sweep_values(&mut self, bits: &HeapBits);
}

pub(crate) trait HeapSweepWeakReference: Sized + Copy {
    /// Returns the reference if its target survived marking.
    fn sweep_weak_reference(self, bits: &HeapBits) -> Option<Self>;
}

impl<T> HeapMarkAndSweep for Option<T>
where
    T: HeapMarkAndSweep,
{
    fn mark_values(&self, queues: &mut WorkQueues) {
        if let Some(content) = self {
            content.mark_values(queues);
        }
    }

    fn sweep_values(&mut self, bits: &HeapBits) {
        if let Some(content) = self {
            content.sweep_values(bits);
        }
    }
}

impl<T> HeapMarkAndSweep for [T]
where
    T: HeapMarkAndSweep,
{
    fn mark_values(&self, queues: &mut WorkQueues) {
        self.iter().for_each(|entry| entry.mark_values(queues));
    }

    fn sweep_values(&mut self, bits: &HeapBits) {
        self.iter_mut().for_each(|entry| entry.sweep_values(bits));
    }
}
