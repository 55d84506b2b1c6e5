// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use alloc::boxed::Box;

use crate::id::ContextId;

/// Boxed error returned by fallible compute functions.
pub type BoxError = Box<dyn core::error::Error + 'static>;

/// Errors surfaced by a [`ContextTree`](crate::ContextTree).
///
/// Everything else in the engine resolves to a well-defined fallback (an
/// unresolved value, a no-op) instead of an error.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// A compute function declared with
    /// [`PropertySpecBuilder::try_compute`](crate::PropertySpecBuilder::try_compute) failed.
    ///
    /// The drain stops at the failing calculation. The cached value of the pair is
    /// left untouched and the pair stays queued for the next drain.
    #[error("compute for property `{property}` failed on {context:?}")]
    Compute {
        /// Name of the property being computed.
        property: &'static str,
        /// Context whose value was being computed.
        context: ContextId,
        /// Error returned by the compute function.
        #[source]
        source: BoxError,
    },
    /// An explicit parent assignment would make a context its own ancestor.
    #[error("assigning {parent:?} as the parent of {context:?} would create a cycle")]
    ParentCycle {
        /// Context receiving the assignment.
        context: ContextId,
        /// Requested parent.
        parent: ContextId,
    },
}
