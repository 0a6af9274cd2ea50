// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::TryReserveError;

/// Failure of an allocating shape operation.
///
/// Allocation failures are recoverable: the shape that the operation was
/// issued against is left exactly as it was, and the object model decides
/// whether to surface the failure as a language-level exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The heap budget would be exceeded by the allocation, or the system
    /// allocator refused it.
    OutOfMemory {
        /// Number of bytes the failed allocation asked for.
        requested: usize,
        /// Configured heap limit, if the budget was the cause.
        limit: Option<usize>,
    },
    /// A property map cannot hold any more properties.
    TooManyProperties { capacity: u32 },
}

pub type AllocResult<T> = Result<T, AllocationError>;

impl core::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AllocationError::OutOfMemory {
                requested,
                limit: Some(limit),
            } => write!(
                f,
                "Out of memory: allocating {requested} bytes exceeds heap limit of {limit} bytes"
            ),
            AllocationError::OutOfMemory {
                requested,
                limit: None,
            } => write!(f, "Out of memory: failed to allocate {requested} bytes"),
            AllocationError::TooManyProperties { capacity } => write!(
                f,
                "Property storage exceeds maximum capacity of {capacity} properties"
            ),
        }
    }
}

impl core::error::Error for AllocationError {}

impl From<TryReserveError> for AllocationError {
    fn from(_: TryReserveError) -> Self {
        AllocationError::OutOfMemory {
            requested: 0,
            limit: None,
        }
    }
}

impl From<hashbrown::TryReserveError> for AllocationError {
    fn from(value: hashbrown::TryReserveError) -> Self {
        let requested = match value {
            hashbrown::TryReserveError::CapacityOverflow => usize::MAX,
            hashbrown::TryReserveError::AllocError { layout } => layout.size(),
        };
        AllocationError::OutOfMemory {
            requested,
            limit: None,
        }
    }
}
