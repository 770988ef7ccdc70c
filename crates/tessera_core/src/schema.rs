//! # Metamodel Lookup Table
//!
//! Static description of record types: their fields, field multiplicity
//! and supertype chain. Built once at startup; every field access resolves
//! through it instead of synthesizing per-instance accessors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Whether a field holds one value or many.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Multiplicity {
    /// Scalar field.
    #[default]
    One,
    /// Collection field.
    Many,
}

/// A field as resolved against the metamodel.
///
/// `owner` is the type that declares the field, which may be a supertype
/// of the record being accessed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    owner: Arc<str>,
    name: Arc<str>,
    multiplicity: Multiplicity,
}

impl FieldRef {
    /// Creates a scalar field reference.
    #[must_use]
    pub fn new(owner: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            multiplicity: Multiplicity::One,
        }
    }

    /// Same field, marked multi-valued.
    #[must_use]
    pub fn many(mut self) -> Self {
        self.multiplicity = Multiplicity::Many;
        self
    }

    /// Declaring type.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Field name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Multiplicity.
    #[inline]
    #[must_use]
    pub const fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// True for collection fields.
    #[inline]
    #[must_use]
    pub fn is_many(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }

    /// `Owner.name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Declaration of one record type.
#[derive(Clone, Debug)]
pub struct RecordType {
    name: Arc<str>,
    parent: Option<Arc<str>>,
    fields: Vec<FieldRef>,
}

impl RecordType {
    /// Starts declaring a type.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Sets the supertype.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<Arc<str>>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declares a scalar field.
    #[must_use]
    pub fn field(mut self, name: impl Into<Arc<str>>) -> Self {
        let field = FieldRef::new(Arc::clone(&self.name), name);
        self.fields.push(field);
        self
    }

    /// Declares a collection field.
    #[must_use]
    pub fn many(mut self, name: impl Into<Arc<str>>) -> Self {
        let field = FieldRef::new(Arc::clone(&self.name), name).many();
        self.fields.push(field);
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared (not inherited) fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }
}

/// The metamodel: record types by name.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    types: HashMap<Arc<str>, RecordType>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type declaration, replacing any previous one with that name.
    #[must_use]
    pub fn with_type(mut self, ty: RecordType) -> Self {
        self.define(ty);
        self
    }

    /// Adds a type declaration in place.
    pub fn define(&mut self, ty: RecordType) {
        self.types.insert(Arc::clone(&ty.name), ty);
    }

    /// Looks up a type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RecordType> {
        self.types.get(name)
    }

    /// The type followed by its supertypes, most specific first.
    ///
    /// Undeclared types yield just themselves. Cycles in the parent chain are
    /// cut at the first repeat.
    #[must_use]
    pub fn hierarchy(&self, type_name: &str) -> Vec<Arc<str>> {
        let mut chain: Vec<Arc<str>> = Vec::new();
        let mut current: Option<Arc<str>> = Some(
            self.types
                .get(type_name)
                .map_or_else(|| Arc::from(type_name), |t| Arc::clone(&t.name)),
        );
        while let Some(name) = current {
            if chain.contains(&name) {
                break;
            }
            current = self.types.get(&*name).and_then(|t| t.parent.clone());
            chain.push(name);
        }
        chain
    }

    /// Resolves `field` on `type_name`, searching supertypes.
    ///
    /// Fields absent from the metamodel resolve to a scalar field owned by
    /// `type_name` itself, so records outside the schema remain usable.
    #[must_use]
    pub fn resolve(&self, type_name: &str, field: &str) -> FieldRef {
        for ty in self.hierarchy(type_name) {
            if let Some(found) = self
                .types
                .get(&*ty)
                .and_then(|t| t.fields.iter().find(|f| f.name() == field))
            {
                return found.clone();
            }
        }
        FieldRef::new(type_name, field)
    }

    /// All fields visible on `type_name`, own fields first.
    #[must_use]
    pub fn fields_of(&self, type_name: &str) -> Vec<FieldRef> {
        self.hierarchy(type_name)
            .iter()
            .filter_map(|t| self.types.get(&**t))
            .flat_map(|t| t.fields.iter().cloned())
            .collect()
    }

    /// True if `type_name` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        self.hierarchy(type_name).iter().any(|t| &**t == ancestor)
    }
}
