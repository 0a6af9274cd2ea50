// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod property_flags;
mod symbol_id;

pub use property_flags::{NamedPropertyDescriptor, PropertyFlags, SlotIndex};
pub use symbol_id::{InternalProperty, SymbolId};
