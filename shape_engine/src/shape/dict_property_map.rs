// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::mem::size_of;

use hashbrown::HashTable;

use crate::{
    error::{AllocResult, AllocationError},
    types::{NamedPropertyDescriptor, SlotIndex, SymbolId},
};

/// Position of a property in a [`DictPropertyMap`].
///
/// A position is only valid until the next insertion into or erasure from
/// the map it was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyPos(u32);

impl PropertyPos {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

type DescriptorPair = (SymbolId, NamedPropertyDescriptor);

/// Ordered map from interned property names to property descriptors.
///
/// ## Layout
///
/// The map consists of a descriptor array holding `(name, descriptor)` pairs
/// in insertion order, and a hash table mapping names to positions in the
/// descriptor array. Erased properties leave a hole (`None`) in the
/// descriptor array so that iteration order and the positions of other
/// properties are unaffected; holes are squeezed out the next time the array
/// would otherwise have to grow.
///
/// Slots of erased properties are pushed onto a deleted-slot list and handed
/// out again, most recently freed first, by
/// [`allocate_property_slot`](Self::allocate_property_slot). Slots are never
/// renumbered: objects hold raw slot indexes.
///
/// All three buffers grow only in [`reserve`](Self::reserve). The deleted-slot
/// list is kept large enough to hold every slot in use, so erasure never
/// allocates.
#[derive(Debug)]
pub struct DictPropertyMap {
    /// Property descriptors in insertion order. `None` marks an erased entry.
    descriptors: Vec<Option<DescriptorPair>>,
    /// Hash table of `(name, descriptor array index)`.
    table: HashTable<(SymbolId, u32)>,
    /// Slots freed by erasure, most recently freed last.
    deleted_slots: Vec<SlotIndex>,
    /// Number of valid properties.
    len: u32,
}

impl DictPropertyMap {
    /// Capacity used when no better estimate is known.
    pub const DEFAULT_CAPACITY: u32 = 2;

    /// Maximum number of descriptor entries a map can hold.
    pub const MAX_CAPACITY: u32 = (1 << 24) - 2;

    const DESCRIPTOR_SIZE: usize = size_of::<Option<DescriptorPair>>();

    /// Bytes per hash table bucket, control byte included.
    const BUCKET_SIZE: usize = size_of::<(SymbolId, u32)>() + 1;

    /// Create a new, empty map able to hold `capacity` properties without
    /// growing.
    pub fn create(capacity: u32) -> AllocResult<Self> {
        if capacity > Self::MAX_CAPACITY {
            return Err(AllocationError::TooManyProperties {
                capacity: Self::MAX_CAPACITY,
            });
        }
        let capacity = capacity.max(Self::DEFAULT_CAPACITY) as usize;
        let mut descriptors = Vec::new();
        descriptors.try_reserve_exact(capacity)?;
        let mut table = HashTable::new();
        table.try_reserve(capacity, |(id, _): &(SymbolId, u32)| id.heap_hash())?;
        let mut deleted_slots = Vec::new();
        deleted_slots.try_reserve_exact(capacity)?;
        Ok(Self {
            descriptors,
            table,
            deleted_slots,
            len: 0,
        })
    }

    /// Estimated number of bytes a freshly created map of the given capacity
    /// occupies. The hash table may round its bucket count up further.
    pub fn allocation_size(capacity: u32) -> usize {
        let capacity = capacity.max(Self::DEFAULT_CAPACITY) as usize;
        size_of::<Self>()
            + capacity * (Self::DESCRIPTOR_SIZE + size_of::<SlotIndex>())
            + Self::table_bytes(capacity)
    }

    /// Number of valid properties in the map.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of properties the map can hold before it must grow.
    pub fn capacity(&self) -> u32 {
        self.descriptors.capacity() as u32
    }

    /// Number of freed slots waiting to be reused.
    pub fn deleted_slot_count(&self) -> u32 {
        self.deleted_slots.len() as u32
    }

    /// Find the position of property `id`.
    pub fn find(&self, id: SymbolId) -> Option<PropertyPos> {
        self.table
            .find(id.heap_hash(), |(key, _)| *key == id)
            .map(|(_, index)| PropertyPos(*index))
    }

    /// Get the name and descriptor at the given position.
    ///
    /// ## Panics
    ///
    /// Panics if the position does not refer to a valid property.
    pub fn descriptor_pair(&self, pos: PropertyPos) -> (SymbolId, NamedPropertyDescriptor) {
        self.descriptors[pos.index()].expect("PropertyPos refers to an erased property")
    }

    /// Get the descriptor at the given position.
    pub fn descriptor(&self, pos: PropertyPos) -> NamedPropertyDescriptor {
        self.descriptor_pair(pos).1
    }

    /// Get the descriptor at the given position as mutable.
    pub fn descriptor_mut(&mut self, pos: PropertyPos) -> &mut NamedPropertyDescriptor {
        let (_, desc) = self.descriptors[pos.index()]
            .as_mut()
            .expect("PropertyPos refers to an erased property");
        desc
    }

    /// Estimated number of heap bytes that must be accounted for before
    /// `additional` new properties can be inserted.
    ///
    /// Each buffer is estimated on its own growth schedule. The hash table
    /// may rehash in place or round up, so callers compare against
    /// [`memory_size`](Self::memory_size) once the reservation is done.
    pub fn growth_bytes(&self, additional: u32) -> usize {
        let live = self.len as usize + additional as usize;

        // Compaction makes room without growing.
        let descriptors = self.descriptors.capacity();
        let descriptor_bytes = if live <= descriptors {
            0
        } else {
            (live.max(descriptors * 2) - descriptors) * Self::DESCRIPTOR_SIZE
        };

        let buckets = self.table.capacity();
        let table_bytes = if live <= buckets {
            0
        } else {
            Self::table_bytes(live.max(buckets * 2)) - Self::table_bytes(buckets)
        };

        let slots = self.slot_count() + additional as usize;
        let deleted = self.deleted_slots.capacity();
        let slot_bytes = if slots <= deleted {
            0
        } else {
            (slots.max(deleted * 2) - deleted) * size_of::<SlotIndex>()
        };

        descriptor_bytes + table_bytes + slot_bytes
    }

    /// Make room for `additional` new properties so that the following
    /// insertions cannot fail.
    ///
    /// Invalidates all positions if the map had to be compacted.
    pub fn reserve(&mut self, additional: u32) -> AllocResult<()> {
        let live = self.len as usize + additional as usize;
        if live > Self::MAX_CAPACITY as usize {
            return Err(AllocationError::TooManyProperties {
                capacity: Self::MAX_CAPACITY,
            });
        }
        if self.descriptors.len() + additional as usize > self.descriptors.capacity() {
            if self.has_holes() {
                self.compact();
            }
            if live > self.descriptors.capacity() {
                let target = live.max(self.descriptors.capacity() * 2);
                self.descriptors
                    .try_reserve_exact(target - self.descriptors.len())?;
            }
        }
        self.table.try_reserve(additional as usize, |(id, _)| id.heap_hash())?;
        // Room for every slot in use, so that erase never allocates.
        self.deleted_slots
            .try_reserve(self.len as usize + additional as usize)?;
        Ok(())
    }

    /// Add a new property, which must not already exist.
    pub fn add(&mut self, id: SymbolId, desc: NamedPropertyDescriptor) -> AllocResult<()> {
        debug_assert!(self.find(id).is_none(), "Adding an existing property to map");
        self.reserve(1)?;
        self.insert_unique(id, desc);
        Ok(())
    }

    /// Find property `id`, or add it with the given descriptor.
    ///
    /// Returns the position of the property and true if it was newly added.
    pub fn find_or_add(
        &mut self,
        id: SymbolId,
        desc: NamedPropertyDescriptor,
    ) -> AllocResult<(PropertyPos, bool)> {
        if let Some(pos) = self.find(id) {
            return Ok((pos, false));
        }
        self.reserve(1)?;
        Ok((self.insert_unique(id, desc), true))
    }

    /// Erase the property at the given position. Its slot is placed on the
    /// deleted-slot list; no other slot is affected. Never allocates.
    pub fn erase(&mut self, pos: PropertyPos) {
        let (id, desc) = self.descriptor_pair(pos);
        match self.table.find_entry(id.heap_hash(), |(key, _)| *key == id) {
            Ok(entry) => {
                entry.remove();
            }
            Err(_) => unreachable!("DictPropertyMap descriptor missing from hash table"),
        }
        self.descriptors[pos.index()] = None;
        debug_assert!(self.deleted_slots.len() < self.deleted_slots.capacity());
        self.deleted_slots.push(desc.slot);
        self.len -= 1;
    }

    /// Allocate a slot for a new property: either the most recently freed
    /// slot, or the next slot past the end of the storage in use.
    pub fn allocate_property_slot(&mut self) -> SlotIndex {
        self.deleted_slots.pop().unwrap_or(self.len)
    }

    /// Call `callback` with each property in insertion order.
    pub fn for_each_property(&self, mut callback: impl FnMut(SymbolId, NamedPropertyDescriptor)) {
        for (id, desc) in self.descriptors.iter().flatten() {
            callback(*id, *desc);
        }
    }

    /// Call `callback` with each property in insertion order until it
    /// returns false.
    ///
    /// Returns false if the callback stopped the iteration.
    pub fn for_each_property_while(
        &self,
        mut callback: impl FnMut(SymbolId, NamedPropertyDescriptor) -> bool,
    ) -> bool {
        self.descriptors
            .iter()
            .flatten()
            .all(|(id, desc)| callback(*id, *desc))
    }

    /// Call `callback` with a mutable reference to each property descriptor
    /// in insertion order.
    pub fn for_each_mutable_property_descriptor(
        &mut self,
        mut callback: impl FnMut(SymbolId, &mut NamedPropertyDescriptor),
    ) {
        for (id, desc) in self.descriptors.iter_mut().flatten() {
            callback(*id, desc);
        }
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, NamedPropertyDescriptor)> + '_ {
        self.descriptors.iter().flatten().copied()
    }

    /// Number of bytes owned by this map.
    pub fn memory_size(&self) -> usize {
        size_of::<Self>()
            + self.descriptors.capacity() * size_of::<Option<DescriptorPair>>()
            + self.table.allocation_size()
            + self.deleted_slots.capacity() * size_of::<SlotIndex>()
    }

    /// Estimated size of a hash table able to hold `capacity` entries.
    /// Buckets are kept at most 7/8 full.
    fn table_bytes(capacity: usize) -> usize {
        capacity * 8 / 7 * Self::BUCKET_SIZE
    }

    /// Number of slots handed out and not yet reused, erased ones included.
    fn slot_count(&self) -> usize {
        self.len as usize + self.deleted_slots.len()
    }

    fn has_holes(&self) -> bool {
        self.descriptors.len() != self.len as usize
    }

    fn insert_unique(&mut self, id: SymbolId, desc: NamedPropertyDescriptor) -> PropertyPos {
        let index = self.descriptors.len() as u32;
        self.descriptors.push(Some((id, desc)));
        self.table
            .insert_unique(id.heap_hash(), (id, index), |(key, _)| key.heap_hash());
        self.len += 1;
        PropertyPos(index)
    }

    /// Squeeze erased entries out of the descriptor array and rebuild the
    /// hash table positions.
    fn compact(&mut self) {
        self.descriptors.retain(Option::is_some);
        self.table.clear();
        for (index, entry) in self.descriptors.iter().enumerate() {
            let Some((id, _)) = entry else {
                unreachable!();
            };
            self.table.insert_unique(
                id.heap_hash(),
                (*id, index as u32),
                |(key, _)| key.heap_hash(),
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::DictPropertyMap;
    use crate::types::{NamedPropertyDescriptor, PropertyFlags, SymbolId};

    fn id(value: u32) -> SymbolId {
        SymbolId::from_u32(value)
    }

    fn desc(slot: u32) -> NamedPropertyDescriptor {
        NamedPropertyDescriptor::new(PropertyFlags::default_new_named_property_flags(), slot)
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut map = DictPropertyMap::create(0).unwrap();
        for (slot, name) in [30, 10, 20, 5, 99].into_iter().enumerate() {
            map.add(id(name), desc(slot as u32)).unwrap();
        }
        let names: Vec<u32> = map.iter().map(|(id, _)| id.into_u32()).collect();
        assert_eq!(names, [30, 10, 20, 5, 99]);
        assert_eq!(map.len(), 5);
        let pos = map.find(id(20)).unwrap();
        assert_eq!(map.descriptor(pos).slot, 2);
    }

    #[test]
    fn erase_keeps_slots_and_recycles_them() {
        let mut map = DictPropertyMap::create(4).unwrap();
        for i in 0..4 {
            let slot = map.allocate_property_slot();
            assert_eq!(slot, i);
            map.add(id(100 + i), desc(slot)).unwrap();
        }
        map.erase(map.find(id(101)).unwrap());
        map.erase(map.find(id(102)).unwrap());
        assert_eq!(map.len(), 2);
        assert!(map.find(id(101)).is_none());
        assert_eq!(map.descriptor(map.find(id(103)).unwrap()).slot, 3);

        // Most recently freed slot comes back first.
        assert_eq!(map.allocate_property_slot(), 2);
        map.add(id(200), desc(2)).unwrap();
        assert_eq!(map.allocate_property_slot(), 1);
        map.add(id(201), desc(1)).unwrap();
        assert_eq!(map.allocate_property_slot(), 4);

        let order: Vec<(u32, u32)> = map
            .iter()
            .map(|(id, desc)| (id.into_u32(), desc.slot))
            .collect();
        assert_eq!(order, [(100, 0), (103, 3), (200, 2), (201, 1)]);
    }

    #[test]
    fn growth_compacts_holes() {
        let mut map = DictPropertyMap::create(2).unwrap();
        map.add(id(10), desc(0)).unwrap();
        map.add(id(11), desc(1)).unwrap();
        map.erase(map.find(id(10)).unwrap());
        let capacity = map.capacity();
        map.add(id(12), desc(0)).unwrap();
        assert_eq!(map.capacity(), capacity);
        let names: Vec<u32> = map.iter().map(|(id, _)| id.into_u32()).collect();
        assert_eq!(names, [11, 12]);
        assert_eq!(map.descriptor(map.find(id(11)).unwrap()).slot, 1);
    }

    #[test]
    fn reserve_covers_hash_table() {
        let mut map = DictPropertyMap::create(0).unwrap();
        for i in 0..64 {
            map.reserve(1).unwrap();
            assert!(map.table.capacity() >= map.len() as usize + 1);
            assert_eq!(map.growth_bytes(1), 0);
            let table_capacity = map.table.capacity();
            let size = map.memory_size();
            map.add(id(i), desc(i)).unwrap();
            assert_eq!(map.table.capacity(), table_capacity, "table grew in add #{i}");
            assert_eq!(map.memory_size(), size);
        }

        // Holes left by erasure do not count against the reservation.
        for i in (0..64).step_by(3) {
            map.erase(map.find(id(i)).unwrap());
        }
        map.reserve(8).unwrap();
        assert_eq!(map.growth_bytes(8), 0);
        let size = map.memory_size();
        for i in 100..108 {
            let slot = map.allocate_property_slot();
            map.add(id(i), desc(slot)).unwrap();
        }
        assert_eq!(map.memory_size(), size);
    }

    #[test]
    fn erase_does_not_allocate() {
        let mut map = DictPropertyMap::create(0).unwrap();
        for i in 0..16 {
            map.add(id(i), desc(i)).unwrap();
        }
        let size = map.memory_size();
        for i in 0..16 {
            map.erase(map.find(id(i)).unwrap());
        }
        assert!(map.is_empty());
        assert_eq!(map.deleted_slot_count(), 16);
        assert_eq!(map.memory_size(), size);
    }

    #[test]
    fn find_or_add_reports_new_entries() {
        let mut map = DictPropertyMap::create(0).unwrap();
        let (pos, added) = map.find_or_add(id(7), desc(0)).unwrap();
        assert!(added);
        let (again, added) = map.find_or_add(id(7), desc(5)).unwrap();
        assert!(!added);
        assert_eq!(pos, again);
        assert_eq!(map.descriptor(pos).slot, 0);
    }

    #[test]
    fn mutable_iteration_rewrites_flags() {
        let mut map = DictPropertyMap::create(0).unwrap();
        map.add(id(1), desc(0)).unwrap();
        map.add(id(2), desc(1)).unwrap();
        map.for_each_mutable_property_descriptor(|_, desc| {
            desc.flags = desc.flags.with_writable(false);
        });
        assert!(map.iter().all(|(_, desc)| !desc.flags.writable()));
        let mut seen = 0;
        let completed = map.for_each_property_while(|_, _| {
            seen += 1;
            false
        });
        assert!(!completed);
        assert_eq!(seen, 1);
    }

    #[test]
    fn oversized_map_is_rejected() {
        assert!(DictPropertyMap::create(DictPropertyMap::MAX_CAPACITY + 1).is_err());
    }
}
