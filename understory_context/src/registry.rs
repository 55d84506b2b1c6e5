// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property registry.
//!
//! This module provides [`PropertyRegistry`] for defining properties and looking
//! up their declarations, topological rank and reverse dependency edges.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::TypeId;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::BoxError;
use crate::id::{Property, PropertyId};
use crate::spec::PropertySpec;
use crate::value::ErasedValue;

/// A registration entry for a property.
pub struct PropertyRegistration<N> {
    name: &'static str,
    type_id: TypeId,
    rank: u16,
    dependents: SmallVec<[PropertyId; 4]>,
    spec: Box<dyn ErasedSpec<N>>,
}

impl<N> PropertyRegistration<N> {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns whether this property is inherited from parent contexts.
    #[must_use]
    #[inline]
    pub fn recursive(&self) -> bool {
        self.spec.recursive()
    }

    /// Returns whether this property has no compute function.
    #[must_use]
    #[inline]
    pub fn is_plain(&self) -> bool {
        !self.spec.has_compute()
    }

    /// Returns the dependencies in declared order.
    #[must_use]
    #[inline]
    pub fn deps(&self) -> &[PropertyId] {
        self.spec.deps()
    }

    /// Returns the properties that declared this one as a dependency.
    #[must_use]
    #[inline]
    pub fn dependents(&self) -> &[PropertyId] {
        &self.dependents
    }

    /// Returns the topological rank: `0` without dependencies, otherwise one
    /// more than the highest rank among the dependencies.
    #[must_use]
    #[inline]
    pub fn rank(&self) -> u16 {
        self.rank
    }

    pub(crate) fn spec(&self) -> &dyn ErasedSpec<N> {
        &*self.spec
    }
}

impl<N> core::fmt::Debug for PropertyRegistration<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("recursive", &self.recursive())
            .field("rank", &self.rank)
            .field("deps", &self.deps())
            .finish_non_exhaustive()
    }
}

/// A registry of context properties.
///
/// Properties are defined once, typically while the host sets up, and the
/// returned [`Property<T>`] handles are then used with every node of a
/// [`ContextTree`](crate::ContextTree). `N` is the host node type handed to
/// compute functions.
///
/// A dependency must be defined before the property that depends on it, so
/// dependency cycles cannot be expressed.
///
/// # Example
///
/// ```rust
/// use understory_context::{PropertyRegistry, PropertySpecBuilder};
///
/// let mut registry = PropertyRegistry::<u32>::new();
/// let theme = registry.define(
///     "Theme",
///     PropertySpecBuilder::new().recursive(true).default_value("light").build(),
/// );
///
/// assert_eq!(registry.name(theme.id()), Some("Theme"));
/// assert!(registry.recursive(theme.id()));
/// assert_eq!(registry.by_name("Theme"), Some(theme.id()));
/// ```
pub struct PropertyRegistry<N> {
    properties: Vec<PropertyRegistration<N>>,
    by_name: HashMap<&'static str, PropertyId>,
}

impl<N> Default for PropertyRegistry<N> {
    fn default() -> Self {
        Self {
            properties: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<N> PropertyRegistry<N> {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of defined properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are defined.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    /// Returns the name of a property.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.get(id).map(|r| r.name)
    }

    /// Returns the registration for a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration<N>> {
        self.properties.get(id.index() as usize)
    }

    /// Returns whether a property is recursive.
    #[must_use]
    pub fn recursive(&self, id: PropertyId) -> bool {
        self.get(id).is_some_and(PropertyRegistration::recursive)
    }

    /// Returns the dependencies of a property, or an empty slice for unknown IDs.
    #[must_use]
    pub fn deps(&self, id: PropertyId) -> &[PropertyId] {
        self.get(id).map(PropertyRegistration::deps).unwrap_or_default()
    }

    /// Returns an iterator over all defined properties.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration<N>)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            let id = PropertyId::new(i as u16);
            (id, r)
        })
    }

    /// Returns the registration for a property handed in by a caller.
    ///
    /// # Panics
    ///
    /// Panics if the property was not defined in this registry.
    pub(crate) fn entry(&self, id: PropertyId) -> &PropertyRegistration<N> {
        match self.get(id) {
            Some(registration) => registration,
            None => panic!("Property {id:?} is not defined in this registry"),
        }
    }
}

impl<N: Copy + 'static> PropertyRegistry<N> {
    /// Defines a new property and returns its typed handle.
    ///
    /// # Panics
    ///
    /// Panics if a property with the same name is already defined, if a
    /// dependency was not defined in this registry, or if more than 65,535
    /// properties are defined.
    pub fn define<T: Clone + PartialEq + 'static>(
        &mut self,
        name: &'static str,
        spec: PropertySpec<N, T>,
    ) -> Property<T> {
        assert!(
            !self.by_name.contains_key(name),
            "Property '{name}' is already defined"
        );
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties defined (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        let mut rank = 0;
        for &dep in spec.deps() {
            let Some(registration) = self.properties.get_mut(dep.index() as usize) else {
                panic!("Dependency {dep:?} of '{name}' is not defined in this registry");
            };
            rank = rank.max(registration.rank + 1);
            registration.dependents.push(id);
        }

        self.properties.push(PropertyRegistration {
            name,
            type_id: TypeId::of::<T>(),
            rank,
            dependents: SmallVec::new(),
            spec: Box::new(spec),
        });
        self.by_name.insert(name, id);

        Property::from_id(id)
    }
}

impl<N> core::fmt::Debug for PropertyRegistry<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("count", &self.properties.len())
            .field(
                "properties",
                &self.properties.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Type-erased declaration trait for heterogeneous storage.
pub(crate) trait ErasedSpec<N> {
    fn recursive(&self) -> bool;
    fn has_compute(&self) -> bool;
    fn deps(&self) -> &[PropertyId];
    fn resolve_erased(&self, input: ResolveInput<'_, N>) -> Result<Option<ErasedValue>, BoxError>;
}

/// Snapshot handed to one calculation.
pub(crate) struct ResolveInput<'a, N> {
    pub(crate) node: N,
    pub(crate) inputs: &'a [&'a ErasedValue],
    pub(crate) latest: Option<&'a ErasedValue>,
    pub(crate) parent: Option<&'a ErasedValue>,
    pub(crate) deps: &'a [(PropertyId, &'a ErasedValue)],
}

impl<N: Copy + 'static, T: Clone + PartialEq + 'static> ErasedSpec<N> for PropertySpec<N, T> {
    fn recursive(&self) -> bool {
        Self::recursive(self)
    }

    fn has_compute(&self) -> bool {
        Self::has_compute(self)
    }

    fn deps(&self) -> &[PropertyId] {
        Self::deps(self)
    }

    fn resolve_erased(&self, input: ResolveInput<'_, N>) -> Result<Option<ErasedValue>, BoxError> {
        let resolved = self.resolve(
            input.node,
            input.inputs.iter().copied(),
            input.latest,
            input.parent,
            input.deps,
        )?;
        Ok(resolved.map(ErasedValue::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::PropertySpecBuilder;
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;

    #[test]
    fn registry_define() {
        let mut registry = PropertyRegistry::<u32>::new();
        assert!(registry.is_empty());

        let a: Property<i32> = registry.define("A", PropertySpecBuilder::new().build());
        assert_eq!(registry.len(), 1);
        assert_eq!(a.id().index(), 0);
        assert_eq!(registry.by_name("A"), Some(a.id()));
        assert_eq!(registry.by_name("B"), None);
        assert_eq!(registry.name(PropertyId::new(99)), None);
    }

    #[test]
    fn ranks_and_dependents() {
        let mut registry = PropertyRegistry::<u32>::new();
        let base: Property<i32> = registry.define("Base", PropertySpecBuilder::new().build());
        let inherited: Property<i32> = registry.define(
            "Inherited",
            PropertySpecBuilder::new().recursive(true).build(),
        );
        let mid: Property<i32> = registry.define(
            "Mid",
            PropertySpecBuilder::new()
                .dep(base)
                .compute(move |cx| *cx.dep(base))
                .build(),
        );
        let top: Property<i32> = registry.define(
            "Top",
            PropertySpecBuilder::new()
                .dep(mid)
                .dep(inherited)
                .compute(move |cx| cx.dep(mid) + cx.dep(inherited))
                .build(),
        );

        assert_eq!(registry.entry(base.id()).rank(), 0);
        assert_eq!(registry.entry(mid.id()).rank(), 1);
        assert_eq!(registry.entry(top.id()).rank(), 2);
        assert_eq!(registry.entry(base.id()).dependents(), &[mid.id()]);
        assert_eq!(registry.entry(inherited.id()).dependents(), &[top.id()]);
        assert_eq!(registry.deps(top.id()), &[mid.id(), inherited.id()]);
        assert!(registry.recursive(inherited.id()));
        assert!(!registry.recursive(top.id()));
        assert!(registry.entry(base.id()).is_plain());
        assert!(!registry.entry(top.id()).is_plain());
    }

    #[test]
    fn iter_in_definition_order() {
        let mut registry = PropertyRegistry::<u32>::new();
        let _: Property<i32> = registry.define("One", PropertySpecBuilder::new().build());
        let _: Property<String> = registry.define("Two", PropertySpecBuilder::new().build());
        let names: Vec<_> = registry.iter().map(|(_, r)| r.name()).collect();
        assert_eq!(names, vec!["One", "Two"]);
    }

    #[test]
    #[should_panic(expected = "already defined")]
    fn duplicate_name_panics() {
        let mut registry = PropertyRegistry::<u32>::new();
        let _: Property<i32> = registry.define("Dup", PropertySpecBuilder::new().build());
        let _: Property<i32> = registry.define("Dup", PropertySpecBuilder::new().build());
    }

    #[test]
    #[should_panic(expected = "not defined in this registry")]
    fn foreign_dependency_panics() {
        let foreign: Property<i32> = Property::from_id(PropertyId::new(5));
        let mut registry = PropertyRegistry::<u32>::new();
        let _: Property<i32> =
            registry.define("Orphan", PropertySpecBuilder::new().dep(foreign).build());
    }

    #[test]
    fn erased_resolution() {
        let mut registry = PropertyRegistry::<u32>::new();
        let plain: Property<&'static str> =
            registry.define("Plain", PropertySpecBuilder::new().default_value("d").build());
        let spec = registry.entry(plain.id()).spec();
        let resolved = spec
            .resolve_erased(ResolveInput {
                node: 1,
                inputs: &[],
                latest: None,
                parent: None,
                deps: &[],
            })
            .unwrap();
        assert_eq!(resolved, Some(ErasedValue::new("d")));
    }

    #[test]
    fn registry_debug() {
        let mut registry = PropertyRegistry::<u32>::new();
        let _: Property<i32> = registry.define("Width", PropertySpecBuilder::new().build());
        let debug = format!("{:?}", registry);
        assert!(debug.contains("PropertyRegistry"));
        assert!(debug.contains("Width"));
    }
}
