//! Typed wrapper over multi-valued fields and query results.

use super::Value;

/// An ordered collection of values with a fixed capability set.
///
/// Filtering always produces a new set; the receiver is never mutated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSet {
    items: Vec<Value>,
}

impl RecordSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Views any value as a set: lists as-is, null as empty, scalars as singletons.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::List(items) => Self { items },
            Value::Null => Self::new(),
            other => Self { items: vec![other] },
        }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when `value` is an element.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// Appends an element.
    pub fn append(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Maps every element.
    pub fn map<T>(&self, f: impl FnMut(&Value) -> T) -> Vec<T> {
        self.items.iter().map(f).collect()
    }

    /// New set with the elements for which `keep` is true.
    #[must_use]
    pub fn filter(&self, mut keep: impl FnMut(&Value) -> bool) -> Self {
        Self {
            items: self.items.iter().filter(|v| keep(v)).cloned().collect(),
        }
    }

    /// New set without the elements for which `drop` is true.
    #[must_use]
    pub fn reject(&self, mut drop: impl FnMut(&Value) -> bool) -> Self {
        self.filter(|v| !drop(v))
    }

    /// Iterates the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Converts back into a list value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::List(self.items)
    }
}

impl FromIterator<Value> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
