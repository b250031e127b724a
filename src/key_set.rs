use core::fmt::Debug;

use crate::hash_table::HashTable;
use crate::hash_table::Iter as TableIter;
use crate::hasher::KeyHasher;
use crate::hasher::Xxh3;

/// A set of fixed-size byte keys, for deduplicating flow keys.
///
/// Backed by a [`HashTable`] whose records carry no value region. Keys are
/// remembered in first-seen order.
///
/// # Examples
///
/// ```rust
/// use flow_hash::KeySet;
///
/// let mut seen = KeySet::new(4);
/// assert!(seen.insert(&[192, 0, 2, 1]));
/// assert!(!seen.insert(&[192, 0, 2, 1]));
/// assert!(seen.contains(&[192, 0, 2, 1]));
/// assert!(!seen.contains(&[192, 0, 2, 2]));
/// assert_eq!(seen.len(), 1);
/// ```
pub struct KeySet<H = Xxh3> {
    table: HashTable<H>,
}

impl<H> Debug for KeySet<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl KeySet<Xxh3> {
    /// Creates an empty set of `key_size`-byte keys.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    pub fn new(key_size: usize) -> Self {
        Self::with_hasher(key_size, Xxh3)
    }
}

impl<H: KeyHasher> KeySet<H> {
    /// Creates an empty set of `key_size`-byte keys hashed with `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    pub fn with_hasher(key_size: usize, hasher: H) -> Self {
        Self {
            table: HashTable::with_hasher(key_size, 0, hasher),
        }
    }

    /// Adds `key` to the set.
    ///
    /// Returns `true` if the key was not present before.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the set's key size.
    #[track_caller]
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let (existed, _) = self.table.find_or_create(key);
        !existed
    }

    /// Returns `true` if `key` is in the set.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the set's key size.
    #[track_caller]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.table.find(key).is_some()
    }
}

impl<H> KeySet<H> {
    /// Returns the number of distinct keys in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Size of every key, in bytes.
    pub fn key_size(&self) -> usize {
        self.table.key_size()
    }

    /// Returns an iterator over the keys in first-seen order.
    pub fn iter(&self) -> Keys<'_> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// Consumes the set, returning the underlying table.
    pub fn into_table(self) -> HashTable<H> {
        self.table
    }
}

impl<'a, H: KeyHasher> Extend<&'a [u8]> for KeySet<H> {
    fn extend<I: IntoIterator<Item = &'a [u8]>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl<'a, H> IntoIterator for &'a KeySet<H> {
    type IntoIter = Keys<'a>;
    type Item = &'a [u8];

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the keys of a [`KeySet`] in first-seen order.
pub struct Keys<'a> {
    inner: TableIter<'a>,
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| record.key())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}
