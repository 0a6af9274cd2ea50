// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hidden class engine for a JavaScript virtual machine.
//!
//! Every object carries an [`ObjectShape`] describing its named properties.
//! Objects built the same way share a shape, so a property lookup can be
//! cached against the shape and reused for every object that has it. See the
//! [`shape`] module for how shapes are organized.
//!
//! All shapes live on the [`Heap`](heap::Heap) owned by an
//! [`Agent`](execution::Agent). Operations that can allocate take the agent
//! mutably and return an [`AllocResult`](error::AllocResult).

pub mod engine;
pub mod error;
pub mod execution;
pub mod heap;
pub mod shape;
pub mod types;

pub use error::{AllocResult, AllocationError};
pub use execution::{Agent, Options};
pub use shape::{ObjectShape, PropertyPos, ShapeFlags, Transition};
pub use types::{NamedPropertyDescriptor, PropertyFlags, SlotIndex, SymbolId};
