// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::RandomState;
use hashbrown::{HashTable, hash_table::Entry};

use crate::types::{InternalProperty, SymbolId};

/// Interning table mapping property name strings to [`SymbolId`]s.
///
/// The first [`InternalProperty::COUNT`] ids are reserved for anonymous
/// internal properties and are never returned by [`intern`](Self::intern).
#[derive(Debug)]
pub struct IdentifierTable {
    /// Name of every id, indexed by the id's value.
    names: Vec<Box<str>>,
    /// Interned names, stored as ids and hashed by their string.
    table: HashTable<SymbolId>,
    hasher: RandomState,
}

impl Default for IdentifierTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierTable {
    pub fn new() -> Self {
        let names = (0..InternalProperty::COUNT)
            .map(|index| format!("<internal{index}>").into_boxed_str())
            .collect();
        Self {
            names,
            table: HashTable::new(),
            hasher: RandomState::new(),
        }
    }

    /// Get the id of `name`, interning it if necessary.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        let Self {
            names,
            table,
            hasher,
        } = self;
        let hash = hasher.hash_one(name);
        match table.entry(
            hash,
            |id| &*names[id.into_u32() as usize] == name,
            |id| hasher.hash_one(&*names[id.into_u32() as usize]),
        ) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = SymbolId::from_u32(names.len() as u32);
                names.push(name.into());
                entry.insert(id);
                log::trace!("Interned {name:?} as {}", id.into_u32());
                id
            }
        }
    }

    /// Get the id of `name` if it has been interned.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.table
            .find(self.hasher.hash_one(name), |id| self.name(*id) == name)
            .copied()
    }

    /// Get the name of an interned id.
    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.into_u32() as usize]
    }

    /// Returns true if the name of `id` is a canonical array index, eg. `"0"`
    /// or `"42"` but not `"007"` or `"4294967295"`.
    pub fn is_index_like(&self, id: SymbolId) -> bool {
        !id.is_internal() && to_array_index(self.name(id)).is_some()
    }

    /// Number of ids handed out, including the reserved internal ids.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn to_array_index(name: &str) -> Option<u32> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || (bytes.len() > 1 && bytes[0] == b'0') {
        return None;
    }
    if !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    // 2^32 - 1 is the maximum array length, not a valid index.
    name.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}
