use core::fmt::Debug;

use crate::hash_table::HashTable;
use crate::hash_table::Iter as TableIter;
use crate::hasher::KeyHasher;
use crate::hasher::Xxh3;
use crate::record::RecordId;

/// Accumulates fixed-size values per key, the way a flow dump aggregates
/// counters per flow key.
///
/// The first time a key is seen its value region is handed to `init`; every
/// later time it is handed to `merge`. Value bytes are opaque to the
/// aggregator; callers encode their own accumulator layout.
///
/// # Examples
///
/// ```rust
/// use flow_hash::Aggregator;
///
/// // key: protocol number, value: (packets: u32, bytes: u32)
/// let mut agg = Aggregator::new(1, 8);
/// for (proto, bytes) in [(6u8, 1500u32), (17, 512), (6, 40)] {
///     agg.aggregate(
///         &[proto],
///         |value| {
///             value[..4].copy_from_slice(&1u32.to_le_bytes());
///             value[4..].copy_from_slice(&bytes.to_le_bytes());
///         },
///         |value| {
///             let packets = u32::from_le_bytes(value[..4].try_into().unwrap()) + 1;
///             let total = u32::from_le_bytes(value[4..].try_into().unwrap()) + bytes;
///             value[..4].copy_from_slice(&packets.to_le_bytes());
///             value[4..].copy_from_slice(&total.to_le_bytes());
///         },
///     );
/// }
///
/// let tcp = agg.get(&[6]).unwrap();
/// assert_eq!(tcp[..4], 2u32.to_le_bytes());
/// assert_eq!(tcp[4..], 1540u32.to_le_bytes());
/// assert_eq!(agg.len(), 2);
/// ```
pub struct Aggregator<H = Xxh3> {
    table: HashTable<H>,
}

impl<H> Debug for Aggregator<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Aggregator<Xxh3> {
    /// Creates an empty aggregator of `key_size`-byte keys and
    /// `value_size`-byte accumulators.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    pub fn new(key_size: usize, value_size: usize) -> Self {
        Self::with_hasher(key_size, value_size, Xxh3)
    }
}

impl<H: KeyHasher> Aggregator<H> {
    /// Creates an empty aggregator that hashes keys with `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    pub fn with_hasher(key_size: usize, value_size: usize, hasher: H) -> Self {
        Self {
            table: HashTable::with_hasher(key_size, value_size, hasher),
        }
    }

    /// Wraps an existing table, keeping its records.
    pub fn from_table(table: HashTable<H>) -> Self {
        Self { table }
    }

    /// Folds one observation of `key` into its accumulator.
    ///
    /// `init` runs on the zero-filled value region of a key seen for the first
    /// time; `merge` runs on the existing value otherwise. Returns the
    /// record's id.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the key size.
    #[track_caller]
    pub fn aggregate(
        &mut self,
        key: &[u8],
        init: impl FnOnce(&mut [u8]),
        merge: impl FnOnce(&mut [u8]),
    ) -> RecordId {
        let (existed, mut record) = self.table.find_or_create(key);
        if existed {
            merge(record.value_mut());
        } else {
            init(record.value_mut());
        }
        record.id()
    }

    /// Returns the accumulator for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the key size.
    #[track_caller]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.table.find(key).map(|record| record.value())
    }
}

impl<H> Aggregator<H> {
    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if nothing has been aggregated.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns an iterator over `(key, value)` pairs in first-seen order.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            inner: self.table.iter(),
        }
    }

    /// The underlying table.
    pub fn table(&self) -> &HashTable<H> {
        &self.table
    }

    /// Consumes the aggregator, returning the underlying table.
    pub fn into_table(self) -> HashTable<H> {
        self.table
    }
}

impl<'a, H> IntoIterator for &'a Aggregator<H> {
    type IntoIter = Entries<'a>;
    type Item = (&'a [u8], &'a [u8]);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the `(key, value)` pairs of an [`Aggregator`].
pub struct Entries<'a> {
    inner: TableIter<'a>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|record| (record.key(), record.value()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Entries<'_> {}
