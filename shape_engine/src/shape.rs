// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Object shapes
//!
//! An object shape (hidden class) describes which named properties an object
//! has, in what order they were added, with which attributes, and in which
//! storage slot their values live. Objects with the same structural history
//! share a shape, which lets property accesses be cached on shape identity.
//!
//! Shapes form a trie: each non-root shape is reached from its parent by a
//! single transition, either adding a property or changing the flags of an
//! existing one. Transitions are cached in the parent's [`TransitionMap`],
//! which holds its children weakly.
//!
//! To answer lookups without walking the whole ancestor chain, a shape can
//! materialize its full property list into a [`DictPropertyMap`]. There is
//! only ever one copy of a given map: when a child needs it, the map is moved
//! from the parent to the child and updated with the child's transition.
//!
//! Objects that delete properties, or grow too many of them, leave the trie
//! and get a private dictionary shape that owns its map and is mutated in
//! place. A dictionary shape never returns to the trie.

mod dict_property_map;
mod transition_map;

use core::{mem::size_of, num::NonZeroU32};

pub use dict_property_map::{DictPropertyMap, PropertyPos};
pub(crate) use transition_map::TransitionMap;

#[cfg(feature = "heap-snapshot")]
use crate::heap::{HeapSnapshot, NodeId};
use crate::{
    engine::NoAllocScope,
    error::AllocResult,
    execution::Agent,
    heap::{
        CellKind, CreateHeapData, Heap, HeapBits, HeapMarkAndSweep, HeapSweepWeakReference,
        WorkQueues,
    },
    types::{InternalProperty, NamedPropertyDescriptor, PropertyFlags, SlotIndex, SymbolId},
};

/// Handle to a shape on the [`Heap`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectShape(NonZeroU32);

/// Key of a shape transition: the property it adds or re-flags, and its new
/// flags.
///
/// Transitions that only change the flags of an existing property carry the
/// flags-transition marker, so they can never alias a transition that adds a
/// property with the same name and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: SymbolId,
    pub flags: PropertyFlags,
}

impl Transition {
    pub const fn new(name: SymbolId, flags: PropertyFlags) -> Self {
        Self { name, flags }
    }
}

/// Facts about all properties of a shape.
///
/// The `all_*` flags are only ever set when known to be true; a cleared flag
/// means "unknown" and is recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeFlags {
    pub all_non_configurable: bool,
    /// Implies `all_non_configurable`.
    pub all_read_only: bool,
    /// Some property name is a canonical array index.
    pub has_index_like_properties: bool,
}

impl ShapeFlags {
    fn with_added_property(self, flags: PropertyFlags, is_index_like: bool) -> Self {
        Self {
            all_non_configurable: self.all_non_configurable && !flags.configurable(),
            all_read_only: self.all_read_only && flags.is_read_only(),
            has_index_like_properties: self.has_index_like_properties || is_index_like,
        }
    }

    fn with_updated_property(self, flags: PropertyFlags) -> Self {
        self.with_added_property(flags, false)
    }
}

#[derive(Debug)]
pub(crate) struct TrieShape {
    /// Shape this one was derived from. `None` only for root shapes.
    ///
    /// Parents are held strongly: a reachable shape keeps its whole ancestor
    /// chain alive.
    parent: Option<ObjectShape>,
    /// Transition from the parent to this shape.
    edge: Option<Transition>,
    transitions: TransitionMap,
    /// Materialized property list of this shape, if this shape currently
    /// holds it.
    cached_map: Option<Box<DictPropertyMap>>,
}

#[derive(Debug)]
pub(crate) struct DictionaryShape {
    /// Property list of the dictionary. `None` once the shape has been
    /// superseded by a no-cache dictionary that took the map over.
    map: Option<Box<DictPropertyMap>>,
    /// Cacheable dictionaries may be used as inline cache keys; any flag
    /// change or deletion moves the object to a fresh no-cache dictionary.
    cacheable: bool,
}

#[derive(Debug)]
pub(crate) enum ShapeKind {
    Trie(TrieShape),
    Dictionary(DictionaryShape),
}

/// Heap data of an [`ObjectShape`].
#[derive(Debug)]
pub struct ShapeRecord {
    kind: ShapeKind,
    flags: ShapeFlags,
    /// Number of slot-bearing properties, reserved internal slots included.
    property_count: u32,
}

impl ShapeRecord {
    fn root() -> Self {
        Self {
            kind: ShapeKind::Trie(TrieShape {
                parent: None,
                edge: None,
                transitions: TransitionMap::Empty,
                cached_map: None,
            }),
            flags: ShapeFlags::default(),
            property_count: 0,
        }
    }

    fn child(parent: ObjectShape, edge: Transition, property_count: u32, flags: ShapeFlags) -> Self {
        Self {
            kind: ShapeKind::Trie(TrieShape {
                parent: Some(parent),
                edge: Some(edge),
                transitions: TransitionMap::Empty,
                cached_map: None,
            }),
            flags,
            property_count,
        }
    }

    fn is_dictionary(&self) -> bool {
        matches!(self.kind, ShapeKind::Dictionary(_))
    }

    fn parent(&self) -> Option<ObjectShape> {
        match &self.kind {
            ShapeKind::Trie(trie) => trie.parent,
            ShapeKind::Dictionary(_) => None,
        }
    }

    fn edge(&self) -> Option<Transition> {
        match &self.kind {
            ShapeKind::Trie(trie) => trie.edge,
            ShapeKind::Dictionary(_) => None,
        }
    }

    fn transitions(&self) -> Option<&TransitionMap> {
        match &self.kind {
            ShapeKind::Trie(trie) => Some(&trie.transitions),
            ShapeKind::Dictionary(_) => None,
        }
    }

    fn trie_transitions_mut(&mut self) -> &mut TransitionMap {
        match &mut self.kind {
            ShapeKind::Trie(trie) => &mut trie.transitions,
            ShapeKind::Dictionary(_) => unreachable!("Dictionary shapes have no transitions"),
        }
    }

    fn map(&self) -> Option<&DictPropertyMap> {
        match &self.kind {
            ShapeKind::Trie(trie) => trie.cached_map.as_deref(),
            ShapeKind::Dictionary(dictionary) => dictionary.map.as_deref(),
        }
    }

    fn map_mut(&mut self) -> Option<&mut DictPropertyMap> {
        match &mut self.kind {
            ShapeKind::Trie(trie) => trie.cached_map.as_deref_mut(),
            ShapeKind::Dictionary(dictionary) => dictionary.map.as_deref_mut(),
        }
    }

    fn dictionary_map(&self) -> &DictPropertyMap {
        match &self.kind {
            ShapeKind::Dictionary(DictionaryShape { map: Some(map), .. }) => map,
            ShapeKind::Dictionary(_) => unreachable!("Use of a superseded dictionary shape"),
            ShapeKind::Trie(_) => unreachable!("Expected a dictionary shape"),
        }
    }

    fn dictionary_map_mut(&mut self) -> &mut DictPropertyMap {
        match &mut self.kind {
            ShapeKind::Dictionary(DictionaryShape { map: Some(map), .. }) => map,
            ShapeKind::Dictionary(_) => unreachable!("Use of a superseded dictionary shape"),
            ShapeKind::Trie(_) => unreachable!("Expected a dictionary shape"),
        }
    }

    fn take_map(&mut self) -> Option<Box<DictPropertyMap>> {
        match &mut self.kind {
            ShapeKind::Trie(trie) => trie.cached_map.take(),
            ShapeKind::Dictionary(dictionary) => dictionary.map.take(),
        }
    }

    fn set_map(&mut self, map: Box<DictPropertyMap>) {
        let slot = match &mut self.kind {
            ShapeKind::Trie(trie) => &mut trie.cached_map,
            ShapeKind::Dictionary(dictionary) => &mut dictionary.map,
        };
        debug_assert!(slot.is_none(), "Property map would be duplicated");
        *slot = Some(map);
    }

    /// Bytes owned by this record outside of the record itself.
    pub(crate) fn owned_memory_size(&self) -> usize {
        self.map().map_or(0, DictPropertyMap::memory_size)
            + self.transitions().map_or(0, TransitionMap::memory_size)
    }

    /// Call `callback` with the kind and size of every cell this record
    /// consists of.
    pub(crate) fn for_each_cell(&self, mut callback: impl FnMut(CellKind, usize)) {
        callback(CellKind::HiddenClass, size_of::<ShapeRecord>());
        if let Some(map) = self.map() {
            callback(CellKind::DictPropertyMap, map.memory_size());
        }
        if let Some(transitions @ TransitionMap::Large(_)) = self.transitions() {
            callback(CellKind::TransitionTable, transitions.memory_size());
        }
    }

    #[cfg(feature = "heap-snapshot")]
    pub(crate) fn snapshot_name(&self) -> &'static str {
        if self.is_dictionary() {
            "HiddenClass(Dictionary)"
        } else {
            "HiddenClass"
        }
    }

    /// Report the out-of-line cells of this shape as separate nodes.
    #[cfg(feature = "heap-snapshot")]
    pub(crate) fn snapshot_add_nodes(&self, shape: ObjectShape, snapshot: &mut impl HeapSnapshot) {
        if let Some(map) = self.map() {
            snapshot.begin_node();
            snapshot.end_node(
                CellKind::DictPropertyMap,
                CellKind::DictPropertyMap.name(),
                NodeId::of(shape, CellKind::DictPropertyMap),
                map.memory_size(),
            );
        }
        // Edges are not interesting on their own: the whole table is a
        // single node.
        if let Some(transitions @ TransitionMap::Large(_)) = self.transitions() {
            snapshot.begin_node();
            snapshot.end_node(
                CellKind::TransitionTable,
                CellKind::TransitionTable.name(),
                NodeId::of(shape, CellKind::TransitionTable),
                transitions.memory_size(),
            );
        }
    }

    #[cfg(feature = "heap-snapshot")]
    pub(crate) fn snapshot_add_edges(&self, shape: ObjectShape, snapshot: &mut impl HeapSnapshot) {
        if let Some(parent) = self.parent() {
            snapshot.add_named_edge("parent", NodeId::of(parent, CellKind::HiddenClass));
        }
        if self.map().is_some() {
            snapshot.add_named_edge(
                "propertyMap",
                NodeId::of(shape, CellKind::DictPropertyMap),
            );
        }
        if let Some(TransitionMap::Large(_)) = self.transitions() {
            snapshot.add_named_edge(
                "transitionMap",
                NodeId::of(shape, CellKind::TransitionTable),
            );
        }
    }
}

impl ObjectShape {
    pub(crate) fn from_index(index: usize) -> Self {
        let value = u32::try_from(index + 1).expect("ObjectShape index out of bounds");
        // SAFETY: index + 1 is never zero.
        Self(unsafe { NonZeroU32::new_unchecked(value) })
    }

    /// Get the implied usize index of the ObjectShape reference.
    #[inline(always)]
    pub(crate) fn get_index(self) -> usize {
        self.0.get().wrapping_sub(1) as usize
    }

    /// Get an Object Shape pointing to the last shape slot.
    pub(crate) fn last(shapes: &[Option<ShapeRecord>]) -> Self {
        debug_assert!(!shapes.is_empty());
        // SAFETY: The shapes list is not empty.
        Self(unsafe { NonZeroU32::new_unchecked(shapes.len() as u32) })
    }

    pub(crate) fn create_root_in(heap: &mut Heap) -> AllocResult<Self> {
        heap.allocate(size_of::<ShapeRecord>())?;
        heap.create(ShapeRecord::root())
    }

    /// Create a new, empty root shape, unrelated to the agent's shared root
    /// shape.
    pub fn create_root(agent: &mut Agent) -> AllocResult<Self> {
        Self::create_root_in(&mut agent.heap)
    }

    /// Create a trie child of `parent`. The child's memory must have been
    /// accounted for already.
    fn create(
        heap: &mut Heap,
        parent: ObjectShape,
        edge: Transition,
        property_count: u32,
        flags: ShapeFlags,
    ) -> AllocResult<Self> {
        heap.create(ShapeRecord::child(parent, edge, property_count, flags))
    }

    pub fn property_count(self, agent: &Agent) -> u32 {
        agent.heap[self].property_count
    }

    pub fn flags(self, agent: &Agent) -> ShapeFlags {
        agent.heap[self].flags
    }

    pub fn is_dictionary(self, agent: &Agent) -> bool {
        agent.heap[self].is_dictionary()
    }

    /// Returns true if the shape is a dictionary that must not be used as an
    /// inline cache key.
    pub fn is_dictionary_no_cache(self, agent: &Agent) -> bool {
        matches!(
            agent.heap[self].kind,
            ShapeKind::Dictionary(DictionaryShape {
                cacheable: false,
                ..
            })
        )
    }

    pub fn has_index_like_properties(self, agent: &Agent) -> bool {
        agent.heap[self].flags.has_index_like_properties
    }

    /// Returns true if the shape certainly has no outgoing transitions.
    pub fn is_known_leaf(self, agent: &Agent) -> bool {
        agent.heap[self]
            .transitions()
            .is_none_or(TransitionMap::is_known_empty)
    }

    pub fn parent(self, agent: &Agent) -> Option<ObjectShape> {
        agent.heap[self].parent()
    }

    /// Transition from the parent to this shape.
    pub fn edge(self, agent: &Agent) -> Option<Transition> {
        agent.heap[self].edge()
    }

    /// Returns true if this shape currently holds a materialized property
    /// map.
    pub fn has_property_map(self, agent: &Agent) -> bool {
        agent.heap[self].map().is_some()
    }

    /// Number of cached outgoing transitions.
    pub fn transition_count(self, agent: &Agent) -> usize {
        agent.heap[self]
            .transitions()
            .map_or(0, TransitionMap::len)
    }

    /// Call `callback` with every cached outgoing transition and its target.
    pub fn for_each_transition(self, agent: &Agent, callback: impl FnMut(Transition, ObjectShape)) {
        if let Some(transitions) = agent.heap[self].transitions() {
            transitions.for_each_entry(callback);
        }
    }

    /// Find the child shape reached through `key`, if it is cached.
    pub fn lookup_transition(self, agent: &Agent, key: Transition) -> Option<ObjectShape> {
        agent.heap[self]
            .transitions()
            .and_then(|transitions| transitions.lookup(&key))
    }

    /// Find property `name`.
    ///
    /// If `expected_flags` is given and this shape already has a transition
    /// adding `name` with those flags, the property cannot exist on this
    /// shape and the lookup returns immediately. Otherwise the property map
    /// is materialized if necessary.
    ///
    /// The returned position is only valid until the next mutating shape
    /// operation.
    pub fn find_property(
        self,
        agent: &mut Agent,
        name: SymbolId,
        expected_flags: Option<PropertyFlags>,
    ) -> AllocResult<Option<(PropertyPos, NamedPropertyDescriptor)>> {
        if !self.has_property_map(agent) {
            if let Some(flags) = expected_flags
                && self
                    .lookup_transition(agent, Transition::new(name, flags))
                    .is_some()
            {
                log::trace!(
                    "Property {} not found in {self:?} due to existing transition",
                    name.into_u32()
                );
                return Ok(None);
            }
            self.initialize_missing_property_map(agent)?;
        }
        let _no_alloc = NoAllocScope::new(&agent.heap);
        let Some(map) = agent.heap[self].map() else {
            unreachable!("Property map missing after initialization");
        };
        Ok(map.find(name).map(|pos| (pos, map.descriptor(pos))))
    }

    /// Find property `name` by walking the ancestor chain, without ever
    /// materializing a property map.
    pub fn find_property_no_alloc(
        self,
        agent: &Agent,
        name: SymbolId,
    ) -> Option<NamedPropertyDescriptor> {
        let heap = &agent.heap;
        let _no_alloc = NoAllocScope::new(heap);
        // Flags of the most recent flags-only transition of the property.
        let mut latest_flags = None;
        let mut current = Some(self);
        while let Some(shape) = current {
            let record = &heap[shape];
            if let Some(map) = record.map() {
                // A map holds every property of its shape.
                let mut desc = map.descriptor(map.find(name)?);
                if let Some(flags) = latest_flags {
                    desc.flags = flags;
                }
                return Some(desc);
            }
            if let Some(edge) = record.edge()
                && edge.name == name
            {
                if edge.flags.flags_transition() {
                    latest_flags.get_or_insert(edge.flags.without_flags_transition());
                } else {
                    return Some(NamedPropertyDescriptor::new(
                        latest_flags.unwrap_or(edge.flags),
                        record.property_count - 1,
                    ));
                }
            }
            current = record.parent();
        }
        None
    }

    /// Find property `name` only if that can be done without walking the
    /// ancestor chain.
    ///
    /// Returns `None` if the answer is unknown, `Some(None)` if the property
    /// certainly does not exist.
    pub fn try_find_property_fast(
        self,
        agent: &Agent,
        name: SymbolId,
    ) -> Option<Option<(PropertyPos, NamedPropertyDescriptor)>> {
        let record = &agent.heap[self];
        if let Some(map) = record.map() {
            return Some(map.find(name).map(|pos| (pos, map.descriptor(pos))));
        }
        if record.property_count == 0 {
            return Some(None);
        }
        None
    }

    /// Returns true if property `name` is defined on this shape.
    pub fn debug_is_property_defined(self, agent: &Agent, name: SymbolId) -> bool {
        let heap = &agent.heap;
        let _no_alloc = NoAllocScope::new(heap);
        let mut current = Some(self);
        while let Some(shape) = current {
            let record = &heap[shape];
            if let Some(map) = record.map() {
                return map.find(name).is_some();
            }
            if record.edge().is_some_and(|edge| edge.name == name) {
                return true;
            }
            current = record.parent();
        }
        false
    }

    /// Add a new property with the given flags.
    ///
    /// Returns the shape of the object after the addition and the slot of the
    /// new property. Dictionary shapes are updated in place and returned.
    ///
    /// The property must not exist yet.
    pub fn add_property(
        self,
        agent: &mut Agent,
        name: SymbolId,
        flags: PropertyFlags,
    ) -> AllocResult<(ObjectShape, SlotIndex)> {
        debug_assert!(!flags.flags_transition());
        let is_index_like = agent.identifiers.is_index_like(name);

        if self.is_dictionary(agent) {
            let slot = self.add_to_dictionary(agent, name, flags, is_index_like)?;
            return Ok((self, slot));
        }

        debug_assert!(
            !self.debug_is_property_defined(agent, name),
            "Adding an existing property to shape"
        );

        let key = Transition::new(name, flags);
        let property_count = agent.heap[self].property_count;

        if let Some(child) = self.lookup_transition(agent, key) {
            if !child.has_property_map(agent)
                && let Some(growth) = agent.heap[self].map().map(|map| map.growth_bytes(1))
            {
                agent.heap.allocate(growth)?;
                let grown = self.reserve_map(agent, 1)?;
                agent.heap.settle(growth, grown);
                let Some(mut map) = agent.heap[self].take_map() else {
                    unreachable!()
                };
                map.add(name, NamedPropertyDescriptor::new(flags, property_count))?;
                agent.heap[child].set_map(map);
                log::debug!("Adding property to {self:?} moves map to existing {child:?}");
            } else {
                // Only one shape on a chain may hold a map.
                if let Some(map) = agent.heap[self].take_map() {
                    agent.heap.settle(map.memory_size(), 0);
                }
                log::trace!("Adding property to {self:?} transitions to existing {child:?}");
            }
            return Ok((child, property_count));
        }

        if property_count >= agent.options.dictionary_threshold {
            let dictionary = self.copy_to_new_dictionary(agent, false)?;
            let slot = dictionary.add_to_dictionary(agent, name, flags, is_index_like)?;
            return Ok((dictionary, slot));
        }

        let record = &agent.heap[self];
        let map_growth = record.map().map_or(0, |map| map.growth_bytes(1));
        let table_growth = record.transitions().map_or(0, TransitionMap::growth_bytes);
        let child_flags = record.flags.with_added_property(flags, is_index_like);
        agent
            .heap
            .allocate(size_of::<ShapeRecord>() + map_growth + table_growth)?;
        let grown = self.reserve_map(agent, 1)? + self.reserve_transition(agent)?;
        agent.heap.settle(map_growth + table_growth, grown);

        let child = Self::create(&mut agent.heap, self, key, property_count + 1, child_flags)?;
        agent.heap[self].trie_transitions_mut().insert_new(key, child);
        if let Some(mut map) = agent.heap[self].take_map() {
            map.add(name, NamedPropertyDescriptor::new(flags, property_count))?;
            agent.heap[child].set_map(map);
            log::debug!("Adding property to {self:?} moves map to new {child:?}");
        } else {
            log::debug!("Adding property to {self:?} creates {child:?}");
        }
        Ok((child, property_count))
    }

    /// Change the flags of the property at `pos`.
    ///
    /// Returns the shape of the object after the change. Unchanged flags
    /// return this shape.
    pub fn update_property(
        self,
        agent: &mut Agent,
        pos: PropertyPos,
        new_flags: PropertyFlags,
    ) -> AllocResult<ObjectShape> {
        debug_assert!(!new_flags.flags_transition());

        if let ShapeKind::Dictionary(dictionary) = &agent.heap[self].kind {
            let cacheable = dictionary.cacheable;
            if agent.heap[self].dictionary_map().descriptor(pos).flags == new_flags {
                return Ok(self);
            }
            let target = if cacheable && agent.options.no_cache_on_dictionary_update {
                self.copy_to_new_dictionary(agent, true)?
            } else {
                self
            };
            let record = &mut agent.heap[target];
            record.dictionary_map_mut().descriptor_mut(pos).flags = new_flags;
            record.flags = record.flags.with_updated_property(new_flags);
            return Ok(target);
        }

        let record = &agent.heap[self];
        let Some(map) = record.map() else {
            unreachable!("Property map must exist in update_property");
        };
        let (name, desc) = map.descriptor_pair(pos);
        if desc.flags == new_flags {
            return Ok(self);
        }
        let key = Transition::new(name, new_flags.as_flags_transition());
        let property_count = record.property_count;
        let child_flags = record.flags.with_updated_property(new_flags);
        let table_growth = record.transitions().map_or(0, TransitionMap::growth_bytes);

        if let Some(child) = self.lookup_transition(agent, key) {
            let Some(mut map) = agent.heap[self].take_map() else {
                unreachable!()
            };
            if child.has_property_map(agent) {
                agent.heap.settle(map.memory_size(), 0);
            } else {
                map.descriptor_mut(pos).flags = new_flags;
                agent.heap[child].set_map(map);
                log::debug!("Updating property in {self:?} moves map to existing {child:?}");
            }
            return Ok(child);
        }

        agent
            .heap
            .allocate(size_of::<ShapeRecord>() + table_growth)?;
        let grown = self.reserve_transition(agent)?;
        agent.heap.settle(table_growth, grown);

        let child = Self::create(&mut agent.heap, self, key, property_count, child_flags)?;
        agent.heap[self].trie_transitions_mut().insert_new(key, child);
        let Some(mut map) = agent.heap[self].take_map() else {
            unreachable!()
        };
        map.descriptor_mut(pos).flags = new_flags;
        agent.heap[child].set_map(map);
        log::debug!("Updating property in {self:?} moves map to new {child:?}");
        Ok(child)
    }

    /// Delete the property at `pos`.
    ///
    /// Deletion cannot be expressed as a trie transition, so trie shapes move
    /// to a new dictionary shape. The slots of the remaining properties are
    /// unchanged.
    pub fn delete_property(self, agent: &mut Agent, pos: PropertyPos) -> AllocResult<ObjectShape> {
        let target = match &agent.heap[self].kind {
            ShapeKind::Trie(_) => {
                debug_assert!(self.has_property_map(agent));
                self.copy_to_new_dictionary(agent, false)?
            }
            ShapeKind::Dictionary(dictionary)
                if dictionary.cacheable && agent.options.no_cache_on_dictionary_delete =>
            {
                self.copy_to_new_dictionary(agent, true)?
            }
            ShapeKind::Dictionary(_) => self,
        };
        let record = &mut agent.heap[target];
        record.property_count -= 1;
        record.dictionary_map_mut().erase(pos);
        log::trace!("Deleting from {self:?} produces {target:?}");
        Ok(target)
    }

    /// Move the property map of this shape into a new, parentless dictionary
    /// shape.
    ///
    /// The property map is materialized first if this shape does not hold
    /// it.
    pub fn copy_to_new_dictionary(self, agent: &mut Agent, no_cache: bool) -> AllocResult<ObjectShape> {
        debug_assert!(
            !self.is_dictionary_no_cache(agent),
            "Shape already in no-cache dictionary mode"
        );
        if !self.has_property_map(agent) {
            self.initialize_missing_property_map(agent)?;
        }
        agent.heap.allocate(size_of::<ShapeRecord>())?;
        let record = &agent.heap[self];
        let dictionary = ShapeRecord {
            kind: ShapeKind::Dictionary(DictionaryShape {
                map: None,
                cacheable: !no_cache,
            }),
            flags: record.flags,
            property_count: record.property_count,
        };
        let dictionary = agent.heap.create(dictionary)?;
        let Some(map) = agent.heap[self].take_map() else {
            unreachable!()
        };
        agent.heap[dictionary].set_map(map);
        log::debug!(
            "Converted {self:?} to {}dictionary {dictionary:?}",
            if no_cache { "no-cache " } else { "" }
        );
        Ok(dictionary)
    }

    /// Make every property non-configurable.
    pub fn make_all_non_configurable(self, agent: &mut Agent) -> AllocResult<ObjectShape> {
        if agent.heap[self].flags.all_non_configurable {
            return Ok(self);
        }
        log::trace!("Making all properties of {self:?} non-configurable");
        let current = self.update_each_property(agent, |flags| flags.with_configurable(false))?;
        agent.heap[current].flags.all_non_configurable = true;
        Ok(current)
    }

    /// Make every property non-configurable and, unless it is an accessor,
    /// non-writable.
    pub fn make_all_read_only(self, agent: &mut Agent) -> AllocResult<ObjectShape> {
        if agent.heap[self].flags.all_read_only {
            return Ok(self);
        }
        log::trace!("Making all properties of {self:?} read-only");
        let current = self.update_each_property(agent, PropertyFlags::frozen)?;
        let flags = &mut agent.heap[current].flags;
        flags.all_non_configurable = true;
        flags.all_read_only = true;
        Ok(current)
    }

    fn update_each_property(
        self,
        agent: &mut Agent,
        change: impl Fn(PropertyFlags) -> PropertyFlags,
    ) -> AllocResult<ObjectShape> {
        if !self.has_property_map(agent) {
            self.initialize_missing_property_map(agent)?;
        }
        let Some(map) = agent.heap[self].map() else {
            unreachable!()
        };
        // Updates only change flags, so the property order stays the same.
        let properties: Vec<_> = map.iter().collect();
        let mut current = self;
        for (name, desc) in properties {
            let new_flags = change(desc.flags);
            if new_flags == desc.flags {
                continue;
            }
            let Some((pos, _)) = current.find_property(agent, name, None)? else {
                unreachable!("Property not found during enumeration");
            };
            current = current.update_property(agent, pos, new_flags)?;
        }
        Ok(current)
    }

    /// Clear and set the given flags on every property, or on the listed
    /// properties only, without creating any transitions.
    ///
    /// The object leaves the trie: the result is always a dictionary shape.
    pub fn update_property_flags_without_transitions(
        self,
        agent: &mut Agent,
        flags_to_clear: PropertyFlags,
        flags_to_set: PropertyFlags,
        properties: Option<&[SymbolId]>,
    ) -> AllocResult<ObjectShape> {
        let target = match &agent.heap[self].kind {
            ShapeKind::Trie(_) => self.copy_to_new_dictionary(agent, false)?,
            ShapeKind::Dictionary(dictionary)
                if dictionary.cacheable && agent.options.no_cache_on_dictionary_update =>
            {
                self.copy_to_new_dictionary(agent, true)?
            }
            ShapeKind::Dictionary(_) => self,
        };
        let record = &mut agent.heap[target];
        let map = record.dictionary_map_mut();
        let change = |desc: &mut NamedPropertyDescriptor| {
            desc.flags = desc.flags.change_flags(flags_to_clear, flags_to_set);
        };
        match properties {
            Some(properties) => {
                for name in properties {
                    if let Some(pos) = map.find(*name) {
                        change(map.descriptor_mut(pos));
                    }
                }
            }
            None => map.for_each_mutable_property_descriptor(|_, desc| change(desc)),
        }
        // Recomputed on demand.
        record.flags.all_non_configurable = false;
        record.flags.all_read_only = false;
        Ok(target)
    }

    /// Add the next reserved internal property.
    pub fn reserve_slot(self, agent: &mut Agent) -> AllocResult<(ObjectShape, SlotIndex)> {
        debug_assert!(
            !self.is_dictionary(agent),
            "Reserved slots can only be added to trie shapes"
        );
        let index = agent.heap[self].property_count;
        debug_assert!(
            index < InternalProperty::COUNT,
            "Reserved slot index is too large"
        );
        self.add_property(agent, SymbolId::internal(index), PropertyFlags::EMPTY)
    }

    /// Call `callback` with every property in insertion order, reserved
    /// internal properties included.
    pub fn for_each_property(
        self,
        agent: &mut Agent,
        mut callback: impl FnMut(SymbolId, NamedPropertyDescriptor),
    ) -> AllocResult<()> {
        self.for_each_property_while(agent, |name, desc| {
            callback(name, desc);
            true
        })
        .map(|_| ())
    }

    /// Call `callback` with every property in insertion order until it
    /// returns false. Returns false if the iteration was stopped early.
    pub fn for_each_property_while(
        self,
        agent: &mut Agent,
        callback: impl FnMut(SymbolId, NamedPropertyDescriptor) -> bool,
    ) -> AllocResult<bool> {
        if !self.has_property_map(agent) {
            self.initialize_missing_property_map(agent)?;
        }
        let Some(map) = agent.heap[self].map() else {
            unreachable!()
        };
        Ok(map.for_each_property_while(callback))
    }

    /// Call `callback` with every property in insertion order without
    /// materializing a property map.
    pub fn for_each_property_no_alloc(
        self,
        agent: &Agent,
        mut callback: impl FnMut(SymbolId, NamedPropertyDescriptor),
    ) {
        let heap = &agent.heap;
        let _no_alloc = NoAllocScope::new(heap);
        let mut properties = Vec::new();
        // Latest flags of re-flagged properties.
        let mut updates: Vec<(SymbolId, PropertyFlags)> = Vec::new();
        let mut map = None;
        let mut current = Some(self);
        while let Some(shape) = current {
            let record = &heap[shape];
            if let Some(found) = record.map() {
                map = Some(found);
                break;
            }
            if let Some(edge) = record.edge() {
                if edge.flags.flags_transition() {
                    if !updates.iter().any(|(name, _)| *name == edge.name) {
                        updates.push((edge.name, edge.flags.without_flags_transition()));
                    }
                } else {
                    properties.push((
                        edge.name,
                        NamedPropertyDescriptor::new(edge.flags, record.property_count - 1),
                    ));
                }
            }
            current = record.parent();
        }
        let mut emit = |name: SymbolId, mut desc: NamedPropertyDescriptor| {
            if let Some((_, flags)) = updates.iter().find(|(updated, _)| *updated == name) {
                desc.flags = *flags;
            }
            callback(name, desc);
        };
        if let Some(map) = map {
            map.for_each_property(&mut emit);
        }
        for (name, desc) in properties.into_iter().rev() {
            emit(name, desc);
        }
    }

    /// Returns true if no property is configurable. A positive answer is
    /// remembered.
    pub fn are_all_non_configurable(self, agent: &mut Agent) -> AllocResult<bool> {
        if agent.heap[self].flags.all_non_configurable {
            return Ok(true);
        }
        let all = self.for_each_property_while(agent, |_, desc| !desc.flags.configurable())?;
        if all {
            agent.heap[self].flags.all_non_configurable = true;
        }
        Ok(all)
    }

    /// Returns true if every property is non-configurable and, unless it is
    /// an accessor, non-writable. A positive answer is remembered.
    pub fn are_all_read_only(self, agent: &mut Agent) -> AllocResult<bool> {
        if agent.heap[self].flags.all_read_only {
            return Ok(true);
        }
        let all = self.for_each_property_while(agent, |_, desc| desc.flags.is_read_only())?;
        if all {
            let flags = &mut agent.heap[self].flags;
            flags.all_non_configurable = true;
            flags.all_read_only = true;
        }
        Ok(all)
    }

    /// Give this shape a property map, taking it over from the nearest
    /// ancestor that holds one or building a new one from the ancestor
    /// chain.
    pub fn initialize_missing_property_map(self, agent: &mut Agent) -> AllocResult<()> {
        debug_assert!(
            !self.has_property_map(agent),
            "Property map is already initialized"
        );
        debug_assert!(
            !self.is_dictionary(agent),
            "Dictionary shapes always hold their property map"
        );

        // Transitions between this shape and the map holder, newest first,
        // with the property count of the shape each one leads to.
        let mut transitions = Vec::new();
        let mut donor = None;
        {
            let heap = &agent.heap;
            let _no_alloc = NoAllocScope::new(heap);
            let mut current = Some(self);
            while let Some(shape) = current {
                let record = &heap[shape];
                if record.map().is_some() {
                    donor = Some(shape);
                    break;
                }
                let Some(edge) = record.edge() else {
                    break;
                };
                transitions.push((edge, record.property_count));
                current = record.parent();
            }
        }
        let added = transitions
            .iter()
            .filter(|(edge, _)| !edge.flags.flags_transition())
            .count() as u32;

        let mut map = match donor {
            Some(donor) => {
                let growth = agent.heap[donor]
                    .map()
                    .map_or(0, |map| map.growth_bytes(added));
                agent.heap.allocate(growth)?;
                let grown = donor.reserve_map(agent, added)?;
                agent.heap.settle(growth, grown);
                let Some(map) = agent.heap[donor].take_map() else {
                    unreachable!()
                };
                log::debug!("{self:?} stealing map from ancestor {donor:?}");
                map
            }
            None => {
                let estimate = DictPropertyMap::allocation_size(added);
                agent.heap.allocate(estimate)?;
                log::debug!("{self:?} allocating new map");
                let map = Box::new(DictPropertyMap::create(added)?);
                agent.heap.settle(estimate, map.memory_size());
                map
            }
        };

        for (edge, property_count) in transitions.into_iter().rev() {
            let flags = edge.flags.without_flags_transition();
            if edge.flags.flags_transition() {
                let Some(pos) = map.find(edge.name) else {
                    unreachable!("Property must exist in flags transition");
                };
                map.descriptor_mut(pos).flags = flags;
            } else {
                map.add(
                    edge.name,
                    NamedPropertyDescriptor::new(flags, property_count - 1),
                )?;
            }
        }
        debug_assert_eq!(map.len(), agent.heap[self].property_count);
        agent.heap[self].set_map(map);
        Ok(())
    }

    fn add_to_dictionary(
        self,
        agent: &mut Agent,
        name: SymbolId,
        flags: PropertyFlags,
        is_index_like: bool,
    ) -> AllocResult<SlotIndex> {
        let growth = agent.heap[self].dictionary_map().growth_bytes(1);
        agent.heap.allocate(growth)?;
        let record = &mut agent.heap[self];
        let map = record.dictionary_map_mut();
        debug_assert!(
            map.find(name).is_none(),
            "Adding an existing property to shape"
        );
        let before = map.memory_size();
        map.reserve(1)?;
        let grown = map.memory_size().saturating_sub(before);
        // Cannot fail after the reservation, so the slot is never lost.
        let slot = map.allocate_property_slot();
        map.add(name, NamedPropertyDescriptor::new(flags, slot))?;
        record.property_count += 1;
        record.flags = record.flags.with_added_property(flags, is_index_like);
        agent.heap.settle(growth, grown);
        Ok(slot)
    }

    /// Make room for `additional` properties in the map of this shape, if it
    /// holds one. Returns the number of bytes the map grew by.
    fn reserve_map(self, agent: &mut Agent, additional: u32) -> AllocResult<usize> {
        let Some(map) = agent.heap[self].map_mut() else {
            return Ok(0);
        };
        let before = map.memory_size();
        map.reserve(additional)?;
        Ok(map.memory_size().saturating_sub(before))
    }

    /// Make room for one more transition out of this trie shape. Returns the
    /// number of bytes the transition table grew by.
    fn reserve_transition(self, agent: &mut Agent) -> AllocResult<usize> {
        let transitions = agent.heap[self].trie_transitions_mut();
        let before = transitions.memory_size();
        transitions.reserve_one()?;
        Ok(transitions.memory_size().saturating_sub(before))
    }
}

impl HeapMarkAndSweep for ObjectShape {
    fn mark_values(&self, queues: &mut WorkQueues) {
        queues.shapes.push(*self);
    }

    fn sweep_values(&mut self, _bits: &HeapBits) {
        // Shapes never move.
    }
}

impl HeapSweepWeakReference for ObjectShape {
    fn sweep_weak_reference(self, bits: &HeapBits) -> Option<Self> {
        bits.is_marked(self).then_some(self)
    }
}

impl HeapMarkAndSweep for ShapeRecord {
    fn mark_values(&self, queues: &mut WorkQueues) {
        // NOTE: transition targets are weakly held; we do not mark them.
        self.parent().mark_values(queues);
    }

    fn sweep_values(&mut self, bits: &HeapBits) {
        if let ShapeKind::Trie(trie) = &mut self.kind {
            trie.transitions.sweep_weak_references(bits);
        }
    }
}
