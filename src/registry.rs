//! Flat factory tables bridging generated artifacts to name-based lookup.
//!
//! Problem-solving environments discover function spaces and forms by name
//! rather than by linking against concrete types. The entries here carry
//! plain function pointers only, so a table row is `Copy` data with no
//! captured state, the closest safe analogue of a C factory table.

use crate::dofmap::Dofmap;
use crate::element::FiniteElement;
use crate::form::Form;
use crate::mapping::CoordinateMapping;
use crate::Real;
use rustc_hash::FxHashMap;

/// Factories for one function space: its element, dofmap and coordinate
/// mapping.
pub struct FunctionSpaceEntry<T: Real> {
    pub create_element: fn() -> Box<dyn FiniteElement<T>>,
    pub create_dofmap: fn() -> Box<dyn Dofmap>,
    pub create_coordinate_mapping: fn() -> Box<dyn CoordinateMapping<T>>,
}

impl<T: Real> Clone for FunctionSpaceEntry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Real> Copy for FunctionSpaceEntry<T> {}

/// Factory for one form, together with the names of its coefficients in
/// coefficient-index order.
pub struct FormEntry<T: Real> {
    pub create_form: fn() -> Box<dyn Form<T>>,
    pub coefficient_names: &'static [&'static str],
}

impl<T: Real> Clone for FormEntry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Real> Copy for FormEntry<T> {}

impl<T: Real> FormEntry<T> {
    /// Index of the coefficient named `name`, if the form has one.
    pub fn coefficient_number(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|&n| n == name)
    }

    /// Name of coefficient `number`, if in range.
    pub fn coefficient_name(&self, number: usize) -> Option<&'static str> {
        self.coefficient_names.get(number).copied()
    }
}

/// Name-keyed table of function space factories.
#[derive(Default)]
pub struct FunctionSpaceRegistry<T: Real> {
    entries: FxHashMap<String, FunctionSpaceEntry<T>>,
}

impl<T: Real> FunctionSpaceRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Registers a space under `name`, returning the previous entry if the
    /// name was already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        entry: FunctionSpaceEntry<T>,
    ) -> Option<FunctionSpaceEntry<T>> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpaceEntry<T>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Name-keyed table of form factories.
#[derive(Default)]
pub struct FormRegistry<T: Real> {
    entries: FxHashMap<String, FormEntry<T>>,
}

impl<T: Real> FormRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        entry: FormEntry<T>,
    ) -> Option<FormEntry<T>> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&FormEntry<T>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
