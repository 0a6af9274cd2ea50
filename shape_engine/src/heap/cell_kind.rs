// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::Heap;

/// Kinds of heap memory owned by the shape engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// A shape record.
    HiddenClass,
    /// A materialized property map owned by a shape.
    DictPropertyMap,
    /// The out-of-line table of a shape with more than one transition.
    TransitionTable,
}

impl CellKind {
    pub const ALL: [CellKind; 3] = [
        CellKind::HiddenClass,
        CellKind::DictPropertyMap,
        CellKind::TransitionTable,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CellKind::HiddenClass => "HiddenClass",
            CellKind::DictPropertyMap => "DictPropertyMap",
            CellKind::TransitionTable => "TransitionTable",
        }
    }
}

impl core::fmt::Display for CellKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStatistics {
    pub count: usize,
    pub bytes: usize,
}

/// Number of cells and bytes in use, per cell kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStatistics {
    hidden_classes: CellStatistics,
    dict_property_maps: CellStatistics,
    transition_tables: CellStatistics,
}

impl HeapStatistics {
    pub fn get(&self, kind: CellKind) -> CellStatistics {
        match kind {
            CellKind::HiddenClass => self.hidden_classes,
            CellKind::DictPropertyMap => self.dict_property_maps,
            CellKind::TransitionTable => self.transition_tables,
        }
    }

    pub fn total_bytes(&self) -> usize {
        CellKind::ALL.iter().map(|kind| self.get(*kind).bytes).sum()
    }

    fn record(&mut self, kind: CellKind, bytes: usize) {
        let entry = match kind {
            CellKind::HiddenClass => &mut self.hidden_classes,
            CellKind::DictPropertyMap => &mut self.dict_property_maps,
            CellKind::TransitionTable => &mut self.transition_tables,
        };
        entry.count += 1;
        entry.bytes += bytes;
    }
}

impl Heap {
    /// Walk every live shape and tally the memory it owns.
    pub fn statistics(&self) -> HeapStatistics {
        let mut stats = HeapStatistics::default();
        for record in self.shapes.iter().flatten() {
            record.for_each_cell(|kind, bytes| stats.record(kind, bytes));
        }
        stats
    }
}
