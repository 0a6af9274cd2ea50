// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::mem::size_of;

use super::{
    Heap,
    heap_bits::{HeapBits, HeapMarkAndSweep, WorkQueues},
};
use crate::shape::{ObjectShape, ShapeRecord};

/// Summary of a single collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of shapes that survived.
    pub marked: usize,
    /// Number of shapes that were freed.
    pub freed: usize,
    /// Bytes owned by the surviving cells.
    pub live_bytes: usize,
}

/// Perform a full, non-moving mark and sweep collection of the heap.
///
/// Every shape reachable from `roots` survives. Parent references are strong,
/// transition targets are weak: transitions to collected shapes are removed
/// from their source shape's transition table before the shape's slot is
/// freed. Roots whose slot has already been freed are ignored.
pub fn collect(heap: &mut Heap, roots: &[ObjectShape]) -> GcStats {
    let mut bits = HeapBits::new(heap);
    let mut queues = WorkQueues::new(heap);

    roots.mark_values(&mut queues);

    while !queues.is_empty() {
        let mut shape_marks: Box<[ObjectShape]> = queues.shapes.drain(..).collect();
        shape_marks.sort();
        shape_marks.iter().for_each(|&shape| {
            let index = shape.get_index();
            if let Some(marked) = bits.shapes.get_mut(index) {
                if *marked {
                    // Already marked, ignore
                    return;
                }
                let Some(record) = &heap.shapes[index] else {
                    log::debug!("Ignoring root {shape:?} in a freed slot");
                    return;
                };
                *marked = true;
                record.mark_values(&mut queues);
            }
        });
    }

    sweep(heap, &bits)
}

fn sweep(heap: &mut Heap, bits: &HeapBits) -> GcStats {
    let mut stats = GcStats {
        marked: bits.marked_count(),
        ..Default::default()
    };
    for index in 0..heap.shapes.len() {
        if bits.shapes[index] {
            let record = heap.shapes[index]
                .as_mut()
                .expect("Marked shape slot is empty");
            record.sweep_values(bits);
            stats.live_bytes += size_of::<ShapeRecord>() + record.owned_memory_size();
        } else if heap.free_shape(index).is_some() {
            stats.freed += 1;
        }
    }
    heap.reset_byte_counters(stats.live_bytes);
    log::debug!(
        "Collected {} shapes, {} survived using {} bytes",
        stats.freed,
        stats.marked,
        stats.live_bytes
    );
    stats
}
