// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::Debug;

/// Index of a property value in an object's backing storage.
///
/// Slot indexes are stable for the lifetime of a property: deleting another
/// property never renumbers them.
pub type SlotIndex = u32;

/// Attribute bits of a named property.
///
/// The bits are packed into a single byte so that a `(name, flags)`
/// transition key stays small and cheap to hash.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    const ENUMERABLE: u8 = 1 << 0;
    const WRITABLE: u8 = 1 << 1;
    const CONFIGURABLE: u8 = 1 << 2;
    const ACCESSOR: u8 = 1 << 3;
    const INTERNAL_SETTER: u8 = 1 << 4;
    const HOST_OBJECT: u8 = 1 << 5;
    /// Marks a transition that only rewrites the flags of an existing
    /// property. Never present in a stored property descriptor.
    const FLAGS_TRANSITION: u8 = 1 << 6;

    /// No attributes set: a non-enumerable, read-only, non-configurable data
    /// property.
    pub const EMPTY: Self = Self(0);

    /// Flags of a property created by plain assignment, eg. `obj.x = 1`.
    pub const fn default_new_named_property_flags() -> Self {
        Self(Self::ENUMERABLE | Self::WRITABLE | Self::CONFIGURABLE)
    }

    /// Flags of a built-in method property: writable and configurable but not
    /// enumerable.
    pub const fn default_builtin_method_flags() -> Self {
        Self(Self::WRITABLE | Self::CONFIGURABLE)
    }

    pub const fn enumerable(self) -> bool {
        self.0 & Self::ENUMERABLE != 0
    }

    pub const fn writable(self) -> bool {
        self.0 & Self::WRITABLE != 0
    }

    pub const fn configurable(self) -> bool {
        self.0 & Self::CONFIGURABLE != 0
    }

    pub const fn accessor(self) -> bool {
        self.0 & Self::ACCESSOR != 0
    }

    pub const fn internal_setter(self) -> bool {
        self.0 & Self::INTERNAL_SETTER != 0
    }

    pub const fn host_object(self) -> bool {
        self.0 & Self::HOST_OBJECT != 0
    }

    pub const fn flags_transition(self) -> bool {
        self.0 & Self::FLAGS_TRANSITION != 0
    }

    #[must_use]
    pub const fn with_enumerable(self, value: bool) -> Self {
        self.with_bit(Self::ENUMERABLE, value)
    }

    #[must_use]
    pub const fn with_writable(self, value: bool) -> Self {
        self.with_bit(Self::WRITABLE, value)
    }

    #[must_use]
    pub const fn with_configurable(self, value: bool) -> Self {
        self.with_bit(Self::CONFIGURABLE, value)
    }

    #[must_use]
    pub const fn with_accessor(self, value: bool) -> Self {
        self.with_bit(Self::ACCESSOR, value)
    }

    #[must_use]
    pub const fn with_internal_setter(self, value: bool) -> Self {
        self.with_bit(Self::INTERNAL_SETTER, value)
    }

    #[must_use]
    pub const fn with_host_object(self, value: bool) -> Self {
        self.with_bit(Self::HOST_OBJECT, value)
    }

    /// Returns these flags tagged as a flags-only transition key.
    #[must_use]
    pub(crate) const fn as_flags_transition(self) -> Self {
        self.with_bit(Self::FLAGS_TRANSITION, true)
    }

    /// Strips the flags-only transition marker.
    #[must_use]
    pub(crate) const fn without_flags_transition(self) -> Self {
        self.with_bit(Self::FLAGS_TRANSITION, false)
    }

    /// Clear every bit set in `clear`, then set every bit set in `set`.
    ///
    /// The flags-only transition marker is never affected.
    #[must_use]
    pub const fn change_flags(self, clear: Self, set: Self) -> Self {
        let mask = !Self::FLAGS_TRANSITION;
        Self((self.0 & !(clear.0 & mask)) | (set.0 & mask))
    }

    /// Returns true if a property with these flags can never be rewritten by
    /// a plain `[[Set]]` or `[[DefineOwnProperty]]`: the "frozen" state.
    pub(crate) const fn is_read_only(self) -> bool {
        !self.configurable() && (self.accessor() || !self.writable())
    }

    /// Returns the flags a property receives when its object is frozen.
    #[must_use]
    pub(crate) const fn frozen(self) -> Self {
        if self.accessor() {
            self.with_configurable(false)
        } else {
            self.with_configurable(false).with_writable(false)
        }
    }

    const fn with_bit(self, bit: u8, value: bool) -> Self {
        if value {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

impl Debug for PropertyFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut set = f.debug_set();
        if self.enumerable() {
            set.entry(&"enumerable");
        }
        if self.writable() {
            set.entry(&"writable");
        }
        if self.configurable() {
            set.entry(&"configurable");
        }
        if self.accessor() {
            set.entry(&"accessor");
        }
        if self.internal_setter() {
            set.entry(&"internal_setter");
        }
        if self.host_object() {
            set.entry(&"host_object");
        }
        if self.flags_transition() {
            set.entry(&"flags_transition");
        }
        set.finish()
    }
}

/// Attribute flags and storage slot of a named property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedPropertyDescriptor {
    pub flags: PropertyFlags,
    pub slot: SlotIndex,
}

impl NamedPropertyDescriptor {
    pub const fn new(flags: PropertyFlags, slot: SlotIndex) -> Self {
        Self { flags, slot }
    }
}
