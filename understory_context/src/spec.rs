// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property declarations.
//!
//! This module provides [`PropertySpec`] for the immutable declaration of one
//! property, [`PropertySpecBuilder`] for ergonomic construction, and [`Compute`],
//! the argument handed to compute functions.

use alloc::boxed::Box;
use smallvec::SmallVec;

use crate::error::BoxError;
use crate::id::{Property, PropertyId};
use crate::value::ErasedValue;

type ComputeFn<N, T> = Box<dyn Fn(&Compute<'_, N, T>) -> Result<T, BoxError>>;

/// Declaration of a context property.
///
/// A property is either *plain* (no compute function: the most recent local input
/// wins, then the parent value for recursive properties, then the default) or
/// *computed* (a pure function of the local inputs, the parent value and the
/// dependency values).
///
/// # Example
///
/// ```rust
/// use understory_context::PropertySpecBuilder;
///
/// let spec = PropertySpecBuilder::<u32, String>::new()
///     .recursive(true)
///     .default_value(String::new())
///     .compute(|cx| {
///         let mut out = cx.parent().cloned().unwrap_or_default();
///         for input in cx.inputs() {
///             out.push_str(input);
///         }
///         out
///     })
///     .build();
///
/// assert!(spec.recursive());
/// assert!(spec.has_compute());
/// assert_eq!(spec.default_value().map(String::as_str), Some(""));
/// ```
pub struct PropertySpec<N, T> {
    recursive: bool,
    deps: SmallVec<[PropertyId; 4]>,
    compute: Option<ComputeFn<N, T>>,
    default_value: Option<T>,
}

impl<N, T> PropertySpec<N, T> {
    /// Returns whether values are inherited from the parent context.
    #[must_use]
    #[inline]
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Returns the dependencies in declared order.
    #[must_use]
    #[inline]
    pub fn deps(&self) -> &[PropertyId] {
        &self.deps
    }

    /// Returns the default value, if any.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> Option<&T> {
        self.default_value.as_ref()
    }

    /// Returns whether a compute function is set.
    #[must_use]
    #[inline]
    pub fn has_compute(&self) -> bool {
        self.compute.is_some()
    }
}

impl<N: Copy, T: Clone + PartialEq + 'static> PropertySpec<N, T> {
    /// Resolves a value from erased inputs.
    ///
    /// `inputs` are in insertion order and `latest` indexes the most recently
    /// written one. Dependency readiness is checked by the caller.
    pub(crate) fn resolve<'a>(
        &'a self,
        node: N,
        inputs: impl Iterator<Item = &'a ErasedValue>,
        latest: Option<&'a ErasedValue>,
        parent: Option<&'a ErasedValue>,
        deps: &'a [(PropertyId, &'a ErasedValue)],
    ) -> Result<Option<T>, BoxError> {
        let parent = if self.recursive {
            parent.and_then(ErasedValue::downcast_ref::<T>)
        } else {
            None
        };
        let Some(compute) = &self.compute else {
            if let Some(latest) = latest.and_then(ErasedValue::downcast_ref::<T>) {
                return Ok(Some(latest.clone()));
            }
            return Ok(parent.or(self.default_value.as_ref()).cloned());
        };

        let inputs: SmallVec<[&'a T; 4]> = inputs.filter_map(ErasedValue::downcast_ref).collect();
        let parent = if self.recursive {
            // Nothing local to combine: inherit as-is.
            if inputs.is_empty()
                && let Some(parent) = parent
            {
                return Ok(Some(parent.clone()));
            }
            match parent.or(self.default_value.as_ref()) {
                Some(parent) => Some(parent),
                None => return Ok(None),
            }
        } else {
            None
        };
        let cx = Compute {
            node,
            inputs,
            parent,
            deps,
        };
        compute(&cx).map(Some)
    }
}

impl<N, T: core::fmt::Debug> core::fmt::Debug for PropertySpec<N, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertySpec")
            .field("recursive", &self.recursive)
            .field("deps", &self.deps)
            .field("has_compute", &self.compute.is_some())
            .field("default_value", &self.default_value)
            .finish()
    }
}

/// Builder for [`PropertySpec`].
///
/// All options default to "off": not recursive, no dependencies, no compute
/// function, no default value.
///
/// # Example
///
/// ```rust
/// use understory_context::{PropertyRegistry, PropertySpecBuilder};
///
/// let mut registry = PropertyRegistry::<u32>::new();
/// let scale = registry.define(
///     "Scale",
///     PropertySpecBuilder::new().recursive(true).default_value(1.0_f64).build(),
/// );
/// let label = registry.define(
///     "Label",
///     PropertySpecBuilder::new()
///         .dep(scale)
///         .compute(move |cx| format!("x{}", cx.dep(scale)))
///         .build(),
/// );
///
/// assert_eq!(registry.deps(label.id()), &[scale.id()]);
/// ```
pub struct PropertySpecBuilder<N, T> {
    recursive: bool,
    deps: SmallVec<[PropertyId; 4]>,
    compute: Option<ComputeFn<N, T>>,
    default_value: Option<T>,
}

impl<N, T> Default for PropertySpecBuilder<N, T> {
    fn default() -> Self {
        Self {
            recursive: false,
            deps: SmallVec::new(),
            compute: None,
            default_value: None,
        }
    }
}

impl<N, T: core::fmt::Debug> core::fmt::Debug for PropertySpecBuilder<N, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertySpecBuilder")
            .field("recursive", &self.recursive)
            .field("deps", &self.deps)
            .field("has_compute", &self.compute.is_some())
            .field("default_value", &self.default_value)
            .finish()
    }
}

impl<N, T> PropertySpecBuilder<N, T> {
    /// Creates a new builder with every option off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the value is inherited from the parent context.
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Appends a dependency.
    ///
    /// The dependency's resolved value on the same node must exist before this
    /// property resolves, and is available to the compute function through
    /// [`Compute::dep`]. Adding the same dependency twice has no effect.
    #[must_use]
    pub fn dep<U>(mut self, dep: Property<U>) -> Self {
        if !self.deps.contains(&dep.id()) {
            self.deps.push(dep.id());
        }
        self
    }

    /// Sets the default value.
    ///
    /// For recursive properties this stands in for a missing parent value. For
    /// plain properties it is the final fallback when there is no input.
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Sets an infallible compute function.
    ///
    /// A panic inside the function propagates out of
    /// [`ContextTree::drain`](crate::ContextTree::drain).
    #[must_use]
    pub fn compute<F>(mut self, compute: F) -> Self
    where
        F: Fn(&Compute<'_, N, T>) -> T + 'static,
    {
        self.compute = Some(Box::new(move |cx| Ok(compute(cx))));
        self
    }

    /// Sets a fallible compute function.
    ///
    /// An error aborts the drain with [`ContextError::Compute`](crate::ContextError::Compute).
    #[must_use]
    pub fn try_compute<F>(mut self, compute: F) -> Self
    where
        F: Fn(&Compute<'_, N, T>) -> Result<T, BoxError> + 'static,
    {
        self.compute = Some(Box::new(compute));
        self
    }

    /// Builds the [`PropertySpec`].
    #[must_use]
    pub fn build(self) -> PropertySpec<N, T> {
        PropertySpec {
            recursive: self.recursive,
            deps: self.deps,
            compute: self.compute,
            default_value: self.default_value,
        }
    }
}

/// Arguments of a compute function.
///
/// Compute functions must be pure: they only see the node, its local inputs in
/// insertion order, the parent value (recursive properties only) and the resolved
/// dependency values on the same node.
pub struct Compute<'a, N, T> {
    node: N,
    inputs: SmallVec<[&'a T; 4]>,
    parent: Option<&'a T>,
    deps: &'a [(PropertyId, &'a ErasedValue)],
}

impl<'a, N: Copy, T> Compute<'a, N, T> {
    /// Returns the host node being computed.
    #[must_use]
    #[inline]
    pub fn node(&self) -> N {
        self.node
    }

    /// Returns the local inputs in owner insertion order.
    #[must_use]
    #[inline]
    pub fn inputs(&self) -> &[&'a T] {
        &self.inputs
    }

    /// Returns the parent value.
    ///
    /// For recursive properties this is the resolved value of the nearest ancestor
    /// tracking the property, or the default value when no ancestor tracks it. Always `None` for non-recursive
    /// properties.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<&'a T> {
        self.parent
    }

    /// Returns the resolved value of a dependency, or `None` when `dep` was not
    /// declared as a dependency of this property.
    #[must_use]
    pub fn try_dep<U: 'static>(&self, dep: Property<U>) -> Option<&'a U> {
        self.deps
            .iter()
            .find(|(id, _)| *id == dep.id())
            .and_then(|(_, value)| value.downcast_ref())
    }

    /// Returns the resolved value of a declared dependency.
    ///
    /// # Panics
    ///
    /// Panics if `dep` was not declared with [`PropertySpecBuilder::dep`].
    #[must_use]
    pub fn dep<U: 'static>(&self, dep: Property<U>) -> &'a U {
        match self.try_dep(dep) {
            Some(value) => value,
            None => panic!("{:?} is not a declared dependency", dep.id()),
        }
    }
}

impl<N: core::fmt::Debug, T> core::fmt::Debug for Compute<'_, N, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compute")
            .field("node", &self.node)
            .field("inputs", &self.inputs.len())
            .field("has_parent", &self.parent.is_some())
            .field("deps", &self.deps.len())
            .finish()
    }
}
