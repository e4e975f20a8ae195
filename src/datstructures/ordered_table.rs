use std::{borrow::Borrow, collections::HashMap, hash::Hash};

/// A map that remembers the order keys were first inserted in.
#[derive(Clone, Debug)]
pub struct OrderedTable<K, V> {
    entries: Vec<(K, V)>,
    positions: HashMap<K, usize>,
}

impl<K, V> Default for OrderedTable<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> OrderedTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.positions.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, value)),
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions
            .get(key)
            .map(|&position| &self.entries[position].1)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = self.positions.remove(key)?;
        let (_, value) = self.entries.remove(position);

        for later in self.positions.values_mut() {
            if *later > position {
                *later -= 1;
            }
        }

        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
