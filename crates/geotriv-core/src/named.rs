//! Insertion-ordered maps keyed by component name.

use indexmap::IndexMap;

/// A map from names to values that remembers insertion order.
///
/// Equality compares entries position by position, so two maps holding the
/// same names in a different order are different values.
#[derive(Debug, Clone)]
pub struct OrderedMap<T> {
    entries: IndexMap<String, T>,
}

impl<T> OrderedMap<T> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Inserts `value` under `name`.
    ///
    /// Replacing an existing name keeps its original position and returns the
    /// previous value.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: T) -> Option<T> {
        self.entries.insert(name.into(), value)
    }

    /// Looks up a value by name.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    /// Looks up a value by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries.get_mut(name)
    }

    /// Whether `name` is present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Mutable entries in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    /// Maps every value, keeping names and order.
    pub fn map_values<U, F: FnMut(&str, &T) -> U>(&self, mut f: F) -> OrderedMap<U> {
        OrderedMap {
            entries: self
                .entries
                .iter()
                .map(|(n, v)| (n.clone(), f(n, v)))
                .collect(),
        }
    }

    /// Fallible version of [`OrderedMap::map_values`].
    pub fn try_map_values<U, E, F>(&self, mut f: F) -> Result<OrderedMap<U>, E>
    where
        F: FnMut(&str, &T) -> Result<U, E>,
    {
        let entries = self
            .entries
            .iter()
            .map(|(n, v)| f(n, v).map(|u| (n.clone(), u)))
            .collect::<Result<IndexMap<_, _>, E>>()?;
        Ok(OrderedMap { entries })
    }
}

impl<T: PartialEq> PartialEq for OrderedMap<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.iter().eq(other.entries.iter())
    }
}

impl<T: Eq> Eq for OrderedMap<T> {}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Into<String>, T> FromIterator<(S, T)> for OrderedMap<T> {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl<T> IntoIterator for OrderedMap<T> {
    type Item = (String, T);
    type IntoIter = indexmap::map::IntoIter<String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedMap<T> {
    type Item = (&'a String, &'a T);
    type IntoIter = indexmap::map::Iter<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
