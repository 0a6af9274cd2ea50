// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::RandomState;

/// Interned property name.
///
/// Ids are handed out by the
/// [`IdentifierTable`](crate::execution::IdentifierTable); the shape engine
/// only ever compares and hashes them.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

// Fixed seeds keep hashing deterministic between runs, which keeps heap
// snapshots and transition table iteration order reproducible.
const SYMBOL_HASHER: RandomState = RandomState::with_seeds(
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

impl SymbolId {
    pub(crate) const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Name of the reserved internal property stored at slot `index`.
    ///
    /// ## Panics
    ///
    /// Panics if `index` is not below [`InternalProperty::COUNT`].
    pub const fn internal(index: u32) -> Self {
        assert!(index < InternalProperty::COUNT, "Internal property index out of range");
        Self(index)
    }

    /// Returns true if this id names a reserved internal property.
    pub const fn is_internal(self) -> bool {
        self.0 < InternalProperty::COUNT
    }

    pub(crate) fn heap_hash(self) -> u64 {
        SYMBOL_HASHER.hash_one(self.0)
    }
}

/// Reserved anonymous properties that the object model stores in the first
/// slots of an object, eg. the primitive value of a wrapper object.
pub struct InternalProperty;

impl InternalProperty {
    /// Number of reserved internal property ids. These ids are never handed
    /// out for named properties.
    pub const COUNT: u32 = 4;
}
