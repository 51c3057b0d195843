//! Named collections.

use fnv::FnvHashMap;

/// Collection of named things.
///
/// Keys are unique, registering a value under an existing key silently
/// replaces the previous value. Iteration order is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle<T> {
    members: FnvHashMap<String, T>,
}

impl<T> Default for Bundle<T> {
    fn default() -> Self {
        Bundle {
            members: FnvHashMap::default(),
        }
    }
}

impl<T> Bundle<T> {
    pub fn new() -> Self {
        Bundle::default()
    }

    /// Registers `val` under `name`, returning the replaced value if any.
    pub fn insert<S: Into<String>>(&mut self, name: S, val: T) -> Option<T> {
        self.members.insert(name.into(), val)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.members.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.members.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.members.remove(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns member names sorted alphabetically.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.members.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.members.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut T)> {
        self.members.iter_mut()
    }

    pub fn members(&self) -> &FnvHashMap<String, T> {
        &self.members
    }
}

impl<T> std::iter::FromIterator<(String, T)> for Bundle<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Bundle {
            members: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Bundle<T> {
    type Item = (String, T);
    type IntoIter = std::collections::hash_map::IntoIter<String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}
