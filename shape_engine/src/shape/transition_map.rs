// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::mem::size_of;

use ahash::{AHashMap, RandomState};

use crate::{
    error::AllocResult,
    heap::{HeapBits, HeapSweepWeakReference, WeakReference},
};

use super::{ObjectShape, Transition};

type LargeTable = AHashMap<Transition, WeakReference<ObjectShape>>;

const TRANSITION_HASHER: RandomState = RandomState::with_seeds(
    0xbe54_66cf_34e9_0c6c,
    0xc0ac_29b7_c97c_50dd,
    0x3f84_d5b5_b547_0917,
    0x9216_d5d9_8979_fb1b,
);

/// Outgoing transitions of a trie shape, keyed by `(name, flags)`.
///
/// The overwhelmingly common case is a shape with exactly one successor, so a
/// single transition is stored inline. A hash table is only created once a
/// second transition is added.
///
/// > NOTE: Targets are held weakly. A child shape that is only reachable
/// > through its parent's transition table is collected, and its transition
/// > entry removed, at the next garbage collection.
#[derive(Debug, Default)]
pub(crate) enum TransitionMap {
    #[default]
    Empty,
    Single(Transition, WeakReference<ObjectShape>),
    Large(Box<LargeTable>),
}

impl TransitionMap {
    /// Returns true if the map is certainly empty.
    ///
    /// A large map that has lost all its entries to garbage collection may
    /// still report false until the next sweep.
    pub(crate) fn is_known_empty(&self) -> bool {
        matches!(self, TransitionMap::Empty)
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            TransitionMap::Empty => 0,
            TransitionMap::Single(..) => 1,
            TransitionMap::Large(table) => table.len(),
        }
    }

    /// Find the child shape reached through `key`.
    pub(crate) fn lookup(&self, key: &Transition) -> Option<ObjectShape> {
        match self {
            TransitionMap::Empty => None,
            TransitionMap::Single(single, target) => (single == key).then_some(target.0),
            TransitionMap::Large(table) => table.get(key).map(|target| target.0),
        }
    }

    pub(crate) fn contains_key(&self, key: &Transition) -> bool {
        self.lookup(key).is_some()
    }

    /// Number of heap bytes that must be accounted for before one more
    /// transition can be inserted.
    pub(crate) fn growth_bytes(&self) -> usize {
        match self {
            TransitionMap::Empty => 0,
            TransitionMap::Single(..) => Self::large_size(2),
            TransitionMap::Large(table) => {
                if table.len() < table.capacity() {
                    0
                } else {
                    Self::large_size(table.capacity().max(1) * 2) - Self::large_size(table.capacity())
                }
            }
        }
    }

    /// Make room for one more transition so that the following
    /// [`insert_new`](Self::insert_new) cannot fail.
    pub(crate) fn reserve_one(&mut self) -> AllocResult<()> {
        match self {
            TransitionMap::Empty => Ok(()),
            TransitionMap::Single(key, target) => {
                let mut table = LargeTable::with_hasher(TRANSITION_HASHER);
                table.try_reserve(2)?;
                table.insert(*key, *target);
                *self = TransitionMap::Large(Box::new(table));
                Ok(())
            }
            TransitionMap::Large(table) => Ok(table.try_reserve(1)?),
        }
    }

    /// Insert a transition that is known not to exist yet.
    ///
    /// [`reserve_one`](Self::reserve_one) must have been called before.
    pub(crate) fn insert_new(&mut self, key: Transition, target: ObjectShape) {
        debug_assert!(
            !self.contains_key(&key),
            "Attempted to overwrite an existing shape transition"
        );
        match self {
            TransitionMap::Empty => *self = TransitionMap::Single(key, WeakReference(target)),
            TransitionMap::Single(..) => {
                unreachable!("Inserting into a single-entry transition map without reserving")
            }
            TransitionMap::Large(table) => {
                table.insert(key, WeakReference(target));
            }
        }
    }

    /// Call `callback` with every transition and its target.
    pub(crate) fn for_each_entry(&self, mut callback: impl FnMut(Transition, ObjectShape)) {
        match self {
            TransitionMap::Empty => {}
            TransitionMap::Single(key, target) => callback(*key, target.0),
            TransitionMap::Large(table) => {
                for (key, target) in table.iter() {
                    callback(*key, target.0);
                }
            }
        }
    }

    /// Number of bytes owned by this map outside of its shape.
    pub(crate) fn memory_size(&self) -> usize {
        match self {
            TransitionMap::Empty | TransitionMap::Single(..) => 0,
            TransitionMap::Large(table) => Self::large_size(table.capacity()),
        }
    }

    /// Drop every transition whose target did not survive marking.
    pub(crate) fn sweep_weak_references(&mut self, bits: &HeapBits) {
        match self {
            TransitionMap::Empty => {}
            TransitionMap::Single(_, target) => {
                if target.0.sweep_weak_reference(bits).is_none() {
                    *self = TransitionMap::Empty;
                }
            }
            TransitionMap::Large(table) => {
                table.retain(|_, target| target.0.sweep_weak_reference(bits).is_some());
                if table.is_empty() {
                    *self = TransitionMap::Empty;
                }
            }
        }
    }

    fn large_size(capacity: usize) -> usize {
        size_of::<LargeTable>()
            + capacity * (size_of::<(Transition, WeakReference<ObjectShape>)>() + 1)
    }
}
