//! The flow table: an open-addressing hash table of fixed-size byte records.
//!
//! Slots are grouped into 16-slot blocks. Each slot carries a one-byte tag
//! (seven hash bits, or `EMPTY`), and a lookup compares all 16 tags of a block
//! with a single SIMD compare before touching any key bytes. Blocks are probed
//! linearly from the key's home block; since nothing is ever removed, the
//! first block with a free slot ends every probe sequence.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::Enumerate;
use core::iter::FusedIterator;

use crate::block::BLOCK_SLOTS;
use crate::block::Block;
use crate::block::hashtag;
use crate::block::home_index;
use crate::error::Error;
use crate::hasher::KeyHasher;
use crate::hasher::Xxh3;
use crate::record::Record;
use crate::record::RecordId;
use crate::record::RecordMut;

/// Block count used by [`HashTable::new`].
pub const DEFAULT_BLOCK_COUNT: usize = 4;

/// Factor the block count is multiplied by on every growth.
const GROWTH_FACTOR: usize = 4;

/// Maximum number of records a table with `slots` slots holds before the next
/// insertion triggers growth. Growth fires once `records / slots > 0.9`.
#[inline(always)]
fn target_load_factor(slots: usize) -> usize {
    ((slots as u128 * 9) / 10) as usize
}

#[inline(always)]
fn exceeds_load_factor(records: usize, block_count: usize) -> bool {
    records as u128 * 10 > block_count as u128 * BLOCK_SLOTS as u128 * 9
}

#[cold]
#[inline(never)]
#[track_caller]
fn key_size_mismatch(expected: usize, actual: usize) -> ! {
    panic!("{}", Error::KeySize { expected, actual })
}

#[cold]
#[inline(never)]
fn probe_exhausted(block_count: usize) -> ! {
    panic!("no free slot in any of {block_count} blocks; block array is corrupt")
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("flow table block count overflow")
}

/// Smallest power-of-two block count that holds `records` records without
/// growing.
fn block_count_for(records: usize) -> usize {
    let mut block_count = 1usize;
    while target_load_factor(block_count.saturating_mul(BLOCK_SLOTS)) < records {
        block_count = match block_count.checked_mul(2) {
            Some(count) => count,
            None => capacity_overflow(),
        };
    }
    block_count
}

/// Outcome of probing for a key.
enum Probe {
    /// A record with an equal key exists.
    Found(usize),
    /// The key is absent; `slot` in `block` is the first free slot on its
    /// probe path.
    Vacant { block: usize, slot: usize },
    /// Every block was visited without a match or a free slot.
    Exhausted,
}

/// A hash table of fixed-size byte records keyed by their leading bytes.
///
/// Every record is `key_size + value_size` bytes: an immutable key followed by
/// a value region the table never interprets. Records are created by
/// [`find_or_create`] and live until the table is dropped; there is no
/// removal.
///
/// ## Performance Characteristics
///
/// - **Memory**: one tag byte and one `usize` per slot, plus one heap
///   allocation of `key_size + value_size` bytes per record.
/// - **Growth**: the block count quadruples once more than 90% of slots are
///   occupied. Records themselves never move.
///
/// ## Example
///
/// ```rust
/// use flow_hash::HashTable;
///
/// // 4-byte source address -> 8-byte packet counter
/// let mut table = HashTable::new(4, 8);
///
/// for src in [[10, 0, 0, 1], [10, 0, 0, 2], [10, 0, 0, 1]] {
///     let (existed, mut record) = table.find_or_create(&src);
///     let packets = if existed {
///         u64::from_le_bytes(record.value().try_into().unwrap()) + 1
///     } else {
///         1
///     };
///     record.value_mut().copy_from_slice(&packets.to_le_bytes());
/// }
///
/// assert_eq!(table.len(), 2);
/// let record = table.find(&[10, 0, 0, 1]).unwrap();
/// assert_eq!(record.value(), 2u64.to_le_bytes());
/// ```
///
/// [`find_or_create`]: HashTable::find_or_create
pub struct HashTable<H = Xxh3> {
    blocks: Vec<Block>,
    records: Vec<Box<[u8]>>,

    key_size: usize,
    value_size: usize,

    hasher: H,
}

impl<H> Debug for HashTable<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("key_size", &self.key_size)
            .field("value_size", &self.value_size)
            .field("records", &self.records.len())
            .field("block_count", &self.blocks.len())
            .field("blocks", &self.blocks)
            .finish()
    }
}

impl HashTable<Xxh3> {
    /// Creates an empty table with [`DEFAULT_BLOCK_COUNT`] blocks.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let table = HashTable::new(16, 24);
    /// assert_eq!(table.record_size(), 40);
    /// assert!(table.is_empty());
    /// ```
    #[track_caller]
    pub fn new(key_size: usize, value_size: usize) -> Self {
        Self::with_hasher(key_size, value_size, Xxh3)
    }

    /// Creates an empty table with `block_count` blocks of 16 slots.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero or `block_count` is not a non-zero power
    /// of two.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let table = HashTable::with_block_count(4, 4, 1);
    /// assert_eq!(table.block_count(), 1);
    /// assert_eq!(table.slot_count(), 16);
    /// ```
    #[track_caller]
    pub fn with_block_count(key_size: usize, value_size: usize, block_count: usize) -> Self {
        Self::with_block_count_and_hasher(key_size, value_size, block_count, Xxh3)
    }

    /// Creates an empty table that can hold at least `records` records before
    /// it grows.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let table = HashTable::with_capacity(4, 4, 1000);
    /// assert!(table.capacity() >= 1000);
    /// assert!(table.block_count().is_power_of_two());
    /// ```
    #[track_caller]
    pub fn with_capacity(key_size: usize, value_size: usize, records: usize) -> Self {
        Self::with_capacity_and_hasher(key_size, value_size, records, Xxh3)
    }
}

impl<H: KeyHasher> HashTable<H> {
    /// Creates an empty table with [`DEFAULT_BLOCK_COUNT`] blocks that hashes
    /// keys with `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    #[track_caller]
    pub fn with_hasher(key_size: usize, value_size: usize, hasher: H) -> Self {
        Self::with_block_count_and_hasher(key_size, value_size, DEFAULT_BLOCK_COUNT, hasher)
    }

    /// Creates an empty table that can hold at least `records` records before
    /// it grows and hashes keys with `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero.
    #[track_caller]
    pub fn with_capacity_and_hasher(
        key_size: usize,
        value_size: usize,
        records: usize,
        hasher: H,
    ) -> Self {
        let block_count = block_count_for(records);
        Self::with_block_count_and_hasher(key_size, value_size, block_count, hasher)
    }

    /// Creates an empty table with `block_count` blocks that hashes keys with
    /// `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if `key_size` is zero or `block_count` is not a non-zero power
    /// of two.
    #[track_caller]
    pub fn with_block_count_and_hasher(
        key_size: usize,
        value_size: usize,
        block_count: usize,
        hasher: H,
    ) -> Self {
        match Self::try_with_block_count_and_hasher(key_size, value_size, block_count, hasher) {
            Ok(table) => table,
            Err(err) => panic!("{err}"),
        }
    }

    /// Checked form of [`with_block_count_and_hasher`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroKeySize`] if `key_size` is zero,
    /// [`Error::RecordSize`] if `key_size + value_size` overflows and
    /// [`Error::BlockCount`] if `block_count` is not a non-zero power of two.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::Error;
    /// # use flow_hash::HashTable;
    /// # use flow_hash::hasher::Xxh3;
    /// #
    /// assert!(HashTable::try_with_block_count_and_hasher(4, 4, 8, Xxh3).is_ok());
    /// assert_eq!(
    ///     HashTable::try_with_block_count_and_hasher(4, 4, 6, Xxh3).unwrap_err(),
    ///     Error::BlockCount(6)
    /// );
    /// ```
    ///
    /// [`with_block_count_and_hasher`]: HashTable::with_block_count_and_hasher
    pub fn try_with_block_count_and_hasher(
        key_size: usize,
        value_size: usize,
        block_count: usize,
        hasher: H,
    ) -> Result<Self, Error> {
        if key_size == 0 {
            return Err(Error::ZeroKeySize);
        }
        if key_size.checked_add(value_size).is_none() {
            return Err(Error::RecordSize {
                key_size,
                value_size,
            });
        }
        if !block_count.is_power_of_two() {
            return Err(Error::BlockCount(block_count));
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(key_size, value_size, block_count, "creating flow table");

        Ok(Self {
            blocks: vec![Block::new(); block_count],
            records: Vec::new(),
            key_size,
            value_size,
            hasher,
        })
    }

    /// Finds the record whose key equals `key`.
    ///
    /// Never modifies the table.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the table's key size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(2, 0);
    /// let (_, record) = table.find_or_create(&[0xAB, 0xCD]);
    /// let id = record.id();
    ///
    /// assert_eq!(table.find(&[0xAB, 0xCD]).map(|r| r.id()), Some(id));
    /// assert!(table.find(&[0xAB, 0xCE]).is_none());
    /// ```
    #[inline]
    #[track_caller]
    pub fn find(&self, key: &[u8]) -> Option<Record<'_>> {
        self.check_key(key);
        self.find_impl(key)
    }

    /// Finds the record whose key equals `key` and returns a handle that can
    /// modify its value.
    ///
    /// Never inserts.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the table's key size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(1, 1);
    /// table.find_or_create(&[7]);
    ///
    /// if let Some(mut record) = table.find_mut(&[7]) {
    ///     record.value_mut()[0] = 99;
    /// }
    /// assert_eq!(table.find(&[7]).unwrap().value(), [99]);
    /// assert!(table.find_mut(&[8]).is_none());
    /// ```
    #[inline]
    #[track_caller]
    pub fn find_mut(&mut self, key: &[u8]) -> Option<RecordMut<'_>> {
        self.check_key(key);
        self.find_mut_impl(key)
    }

    /// Finds the record whose key equals `key`, creating it if absent.
    ///
    /// Returns `true` alongside the handle if the record already existed. A
    /// freshly created record has a zero-filled value region; the caller is
    /// expected to initialize it. Creating a record may grow the table, which
    /// never changes existing records or their ids.
    ///
    /// # Panics
    ///
    /// Panics if `key.len()` differs from the table's key size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(4, 4);
    ///
    /// let (existed, mut record) = table.find_or_create(b"flow");
    /// assert!(!existed);
    /// record.value_mut().copy_from_slice(&1u32.to_le_bytes());
    /// let id = record.id();
    ///
    /// let (existed, record) = table.find_or_create(b"flow");
    /// assert!(existed);
    /// assert_eq!(record.id(), id);
    /// assert_eq!(table.len(), 1);
    /// ```
    #[inline]
    #[track_caller]
    pub fn find_or_create(&mut self, key: &[u8]) -> (bool, RecordMut<'_>) {
        self.check_key(key);
        self.find_or_create_impl(key)
    }

    /// Checked form of [`find`](HashTable::find).
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySize`] if `key.len()` differs from the table's key
    /// size.
    pub fn try_find(&self, key: &[u8]) -> Result<Option<Record<'_>>, Error> {
        self.validate_key(key)?;
        Ok(self.find_impl(key))
    }

    /// Checked form of [`find_mut`](HashTable::find_mut).
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySize`] if `key.len()` differs from the table's key
    /// size.
    pub fn try_find_mut(&mut self, key: &[u8]) -> Result<Option<RecordMut<'_>>, Error> {
        self.validate_key(key)?;
        Ok(self.find_mut_impl(key))
    }

    /// Checked form of [`find_or_create`](HashTable::find_or_create).
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySize`] if `key.len()` differs from the table's key
    /// size. The table is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::Error;
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(4, 0);
    /// let err = table.try_find_or_create(&[1, 2, 3]).unwrap_err();
    /// assert_eq!(err, Error::KeySize { expected: 4, actual: 3 });
    /// assert!(table.is_empty());
    /// ```
    pub fn try_find_or_create(&mut self, key: &[u8]) -> Result<(bool, RecordMut<'_>), Error> {
        self.validate_key(key)?;
        Ok(self.find_or_create_impl(key))
    }

    #[inline(always)]
    #[track_caller]
    fn check_key(&self, key: &[u8]) {
        if key.len() != self.key_size {
            key_size_mismatch(self.key_size, key.len());
        }
    }

    #[inline(always)]
    fn validate_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.key_size {
            return Err(Error::KeySize {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn find_impl(&self, key: &[u8]) -> Option<Record<'_>> {
        if self.records.is_empty() {
            return None;
        }

        match self.probe(self.hasher.hash_key(key), key) {
            Probe::Found(index) => Some(self.record(index)),
            Probe::Vacant { .. } | Probe::Exhausted => None,
        }
    }

    #[inline]
    fn find_mut_impl(&mut self, key: &[u8]) -> Option<RecordMut<'_>> {
        if self.records.is_empty() {
            return None;
        }

        match self.probe(self.hasher.hash_key(key), key) {
            Probe::Found(index) => Some(self.record_mut(index)),
            Probe::Vacant { .. } | Probe::Exhausted => None,
        }
    }

    #[inline]
    fn find_or_create_impl(&mut self, key: &[u8]) -> (bool, RecordMut<'_>) {
        let hash = self.hasher.hash_key(key);
        match self.probe(hash, key) {
            Probe::Found(index) => (true, self.record_mut(index)),
            Probe::Vacant { block, slot } => {
                let index = self.insert_at(block, slot, hashtag(hash), key);
                (false, self.record_mut(index))
            }
            Probe::Exhausted => probe_exhausted(self.blocks.len()),
        }
    }

    /// Walk the probe path of `hash` until a record with an equal key or a
    /// free slot turns up.
    #[inline]
    fn probe(&self, hash: u64, key: &[u8]) -> Probe {
        let mask = self.block_mask();
        let tag = hashtag(hash);
        let mut index = home_index(hash, mask);

        for _ in 0..self.blocks.len() {
            // SAFETY: `index` is masked by `block_count - 1` and `block_count`
            // is a power of two equal to `blocks.len()`.
            let block = unsafe { self.blocks.get_unchecked(index) };
            let scan = block.scan(tag);

            for slot in scan.matches {
                // SAFETY: `slot` comes from a 16-lane mask and its tag is not
                // `EMPTY`, so the slot is occupied.
                let record = unsafe { block.record(slot) };
                if self.records[record].starts_with(key) {
                    return Probe::Found(record);
                }
            }

            if let Some(slot) = scan.empties.lowest() {
                return Probe::Vacant { block: index, slot };
            }

            index = (index + 1) & mask;
        }

        Probe::Exhausted
    }

    /// Allocate a record for `key` and claim `slot` of `block` for it.
    fn insert_at(&mut self, block: usize, slot: usize, tag: u8, key: &[u8]) -> usize {
        let index = self.records.len();

        let mut record = vec![0u8; self.key_size + self.value_size].into_boxed_slice();
        record[..self.key_size].copy_from_slice(key);
        self.records.push(record);
        self.blocks[block].occupy(slot, tag, index);

        if exceeds_load_factor(self.records.len(), self.blocks.len()) {
            self.grow();
        }

        index
    }

    /// Quadruple the block count and re-home every record.
    ///
    /// The new block array is built off to the side and swapped in whole.
    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let block_count = match self.blocks.len().checked_mul(GROWTH_FACTOR) {
            Some(count) => count,
            None => capacity_overflow(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            from = self.blocks.len(),
            to = block_count,
            records = self.records.len(),
            "growing flow table"
        );

        self.blocks = rehash(&self.records, self.key_size, &self.hasher, block_count);
    }

    #[inline(always)]
    fn block_mask(&self) -> usize {
        self.blocks.len() - 1
    }

    #[inline(always)]
    fn record(&self, index: usize) -> Record<'_> {
        Record::new(RecordId(index), &self.records[index], self.key_size)
    }

    #[inline(always)]
    fn record_mut(&mut self, index: usize) -> RecordMut<'_> {
        RecordMut::new(RecordId(index), &mut self.records[index], self.key_size)
    }
}

/// Place every record of `records`, in order, into a fresh array of
/// `block_count` empty blocks.
///
/// Keys are known to be distinct, so each record goes to the first free slot
/// on its probe path without comparing keys.
fn rehash<H: KeyHasher>(
    records: &[Box<[u8]>],
    key_size: usize,
    hasher: &H,
    block_count: usize,
) -> Vec<Block> {
    debug_assert!(block_count.is_power_of_two());
    debug_assert!(records.len() <= block_count * BLOCK_SLOTS);

    let mut blocks = vec![Block::new(); block_count];
    let mask = block_count - 1;

    'records: for (index, record) in records.iter().enumerate() {
        let hash = hasher.hash_key(&record[..key_size]);
        let tag = hashtag(hash);
        let mut block_index = home_index(hash, mask);

        for _ in 0..block_count {
            let block = &mut blocks[block_index];
            if let Some(slot) = block.empty_slots().lowest() {
                block.occupy(slot, tag, index);
                continue 'records;
            }
            block_index = (block_index + 1) & mask;
        }

        probe_exhausted(block_count);
    }

    blocks
}

impl<H> HashTable<H> {
    /// Returns the number of records in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(1, 0);
    /// assert_eq!(table.len(), 0);
    /// table.find_or_create(&[1]);
    /// table.find_or_create(&[1]);
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of every key, in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Size of every value region, in bytes.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Size of a whole record, `key_size + value_size`.
    pub fn record_size(&self) -> usize {
        self.key_size + self.value_size
    }

    /// Number of 16-slot blocks. Always a power of two.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of slots, `16 * block_count`.
    pub fn slot_count(&self) -> usize {
        self.blocks.len() * BLOCK_SLOTS
    }

    /// Number of records the table holds before the next insertion grows it.
    ///
    /// # Load Factor
    ///
    /// The table grows once more than 90% of its slots are occupied.
    pub fn capacity(&self) -> usize {
        target_load_factor(self.slot_count())
    }

    /// The key hasher.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns the record with id `id`, if it belongs to this table.
    pub fn get(&self, id: RecordId) -> Option<Record<'_>> {
        self.records
            .get(id.0)
            .map(|bytes| Record::new(id, bytes, self.key_size))
    }

    /// Returns a writable handle to the record with id `id`, if it belongs to
    /// this table.
    pub fn get_mut(&mut self, id: RecordId) -> Option<RecordMut<'_>> {
        let key_size = self.key_size;
        self.records
            .get_mut(id.0)
            .map(|bytes| RecordMut::new(id, bytes, key_size))
    }

    /// Returns an iterator over all records in insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(1, 0);
    /// for key in [3u8, 1, 2, 1] {
    ///     table.find_or_create(&[key]);
    /// }
    ///
    /// let keys: Vec<u8> = table.iter().map(|r| r.key()[0]).collect();
    /// assert_eq!(keys, [3, 1, 2]);
    /// ```
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            records: self.records.iter().enumerate(),
            key_size: self.key_size,
        }
    }
}

impl<'a, H> IntoIterator for &'a HashTable<H> {
    type IntoIter = Iter<'a>;
    type Item = Record<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the records of a [`HashTable`] in insertion order.
///
/// Created by [`HashTable::iter`].
pub struct Iter<'a> {
    records: Enumerate<core::slice::Iter<'a, Box<[u8]>>>,
    key_size: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Record<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (index, bytes) = self.records.next()?;
        Some(Record::new(RecordId(index), bytes, self.key_size))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

/// Occupancy and probe-length statistics for a [`HashTable`].
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct TableStats {
    /// Number of records in the table
    pub records: usize,
    /// Number of 16-slot blocks
    pub block_count: usize,
    /// Total number of slots
    pub slot_count: usize,
    /// Records the table holds before it grows
    pub capacity: usize,
    /// Occupied slots / total slots
    pub load_factor: f64,
    /// Number of completely full blocks
    pub full_blocks: usize,
    /// `probe_histogram[d]` counts records stored `d` blocks past their home
    /// block
    pub probe_histogram: Vec<usize>,
    /// Bytes used by the block array
    pub block_bytes: usize,
    /// Bytes used by record payloads (key + value)
    pub record_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl TableStats {
    /// Largest distance of any record from its home block.
    pub fn max_probe_distance(&self) -> usize {
        self.probe_histogram.len().saturating_sub(1)
    }

    /// Pretty-print the statistics and the probe-distance histogram.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Flow Table Statistics ===");
        println!(
            "Records: {}/{} slots ({:.2}% load factor, grows after {})",
            self.records,
            self.slot_count,
            self.load_factor * 100.0,
            self.capacity
        );
        println!(
            "Blocks: {} ({} full, {} bytes)",
            self.block_count, self.full_blocks, self.block_bytes
        );
        println!("Record payloads: {} bytes", self.record_bytes);

        let max = self.probe_histogram.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!("probe histogram ({} records):", self.records);
        for (distance, &count) in self.probe_histogram.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{:>3} | {} ({})", distance, "█".repeat(width), count);
        }
    }
}

#[cfg(any(test, feature = "stats"))]
impl<H: KeyHasher> HashTable<H> {
    /// Returns occupancy and probe-length statistics.
    ///
    /// Rehashes every stored key, so this costs about as much as a growth.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "stats")]
    /// # {
    /// # use flow_hash::HashTable;
    /// #
    /// let mut table = HashTable::new(8, 0);
    /// for i in 0..100u64 {
    ///     table.find_or_create(&i.to_le_bytes());
    /// }
    ///
    /// let stats = table.stats();
    /// assert_eq!(stats.records, 100);
    /// assert_eq!(stats.probe_histogram.iter().sum::<usize>(), 100);
    /// # }
    /// ```
    pub fn stats(&self) -> TableStats {
        let mask = self.block_mask();
        let mut probe_histogram = Vec::new();
        let mut full_blocks = 0;

        for (block_index, block) in self.blocks.iter().enumerate() {
            if !block.empty_slots().any() {
                full_blocks += 1;
            }

            for record in block.occupied() {
                let hash = self.hasher.hash_key(&self.records[record][..self.key_size]);
                let distance = block_index.wrapping_sub(home_index(hash, mask)) & mask;
                if probe_histogram.len() <= distance {
                    probe_histogram.resize(distance + 1, 0);
                }
                probe_histogram[distance] += 1;
            }
        }

        TableStats {
            records: self.records.len(),
            block_count: self.blocks.len(),
            slot_count: self.slot_count(),
            capacity: self.capacity(),
            load_factor: self.records.len() as f64 / self.slot_count() as f64,
            full_blocks,
            probe_histogram,
            block_bytes: self.blocks.len() * core::mem::size_of::<Block>(),
            record_bytes: self.records.len() * self.record_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::block::EMPTY;

    /// Keyed SipHash, so every run exercises a different layout.
    struct SipKeyHasher {
        k0: u64,
        k1: u64,
    }

    impl SipKeyHasher {
        fn random() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }
    }

    impl KeyHasher for SipKeyHasher {
        fn hash_key(&self, key: &[u8]) -> u64 {
            let mut h = SipHasher::new_with_keys(self.k0, self.k1);
            h.write(key);
            h.finish()
        }
    }

    /// Sends every key to the same home block with the same tag.
    struct ConstantHasher(u64);

    impl KeyHasher for ConstantHasher {
        fn hash_key(&self, _key: &[u8]) -> u64 {
            self.0
        }
    }

    /// Uses the key's first eight bytes as the hash.
    struct IdentityHasher;

    impl KeyHasher for IdentityHasher {
        fn hash_key(&self, key: &[u8]) -> u64 {
            let mut word = [0u8; 8];
            let len = key.len().min(8);
            word[..len].copy_from_slice(&key[..len]);
            u64::from_le_bytes(word)
        }
    }

    fn key4(k: u32) -> [u8; 4] {
        k.to_le_bytes()
    }

    fn assert_invariants<H: KeyHasher>(table: &HashTable<H>) {
        assert!(table.block_count().is_power_of_two());
        assert!(
            !exceeds_load_factor(table.len(), table.block_count()),
            "load factor exceeded after insertion: {:#?}",
            table
        );

        let mask = table.block_mask();
        let mut seen = vec![false; table.len()];
        for (block_index, block) in table.blocks.iter().enumerate() {
            for slot in 0..BLOCK_SLOTS {
                let tag = block.tags()[slot];
                if tag == EMPTY {
                    continue;
                }
                // SAFETY: the slot's tag is not EMPTY.
                let record = unsafe { block.record(slot) };
                assert!(!seen[record], "record {record} referenced twice");
                seen[record] = true;

                let hash = table.hasher.hash_key(&table.records[record][..table.key_size]);
                assert_eq!(tag, hashtag(hash));

                // Every block between home and the record's block must be full,
                // otherwise a probe would stop before reaching it.
                let mut index = home_index(hash, mask);
                while index != block_index {
                    assert!(!table.blocks[index].empty_slots().any());
                    index = (index + 1) & mask;
                }
            }
        }
        assert!(seen.iter().all(|&s| s), "record missing from blocks");
    }

    #[test]
    fn insert_and_find() {
        let mut table = HashTable::with_hasher(8, 4, SipKeyHasher::random());
        for k in 0..32u64 {
            let key = k.to_le_bytes();
            let (existed, mut record) = table.find_or_create(&key);
            assert!(!existed);
            record.value_mut().copy_from_slice(&(k as u32 * 2).to_le_bytes());
            assert_eq!(
                table.find(&key).map(|r| r.value()),
                Some(&(k as u32 * 2).to_le_bytes()[..]),
                "{:#?}",
                table
            );
        }
        assert_eq!(table.len(), 32);

        for k in 0..32u64 {
            let record = table.find(&k.to_le_bytes()).unwrap();
            assert_eq!(record.key(), k.to_le_bytes());
            assert_eq!(record.value(), (k as u32 * 2).to_le_bytes());
        }
        assert!(table.find(&999u64.to_le_bytes()).is_none());
        assert_invariants(&table);
    }

    #[test]
    fn find_on_empty_table() {
        let table = HashTable::new(4, 4);
        assert!(table.find(&key4(0)).is_none());
        assert!(table.try_find(&key4(0)).unwrap().is_none());
    }

    #[test]
    fn round_trip_preserves_identity() {
        let mut table = HashTable::with_block_count(4, 4, 1);
        let mut handles = Vec::new();
        for k in 0..500u32 {
            let (existed, record) = table.find_or_create(&key4(k));
            assert!(!existed);
            handles.push((k, record.id(), record.as_bytes().as_ptr()));
        }

        for (k, id, ptr) in handles {
            let record = table.find(&key4(k)).unwrap();
            assert_eq!(record.id(), id);
            assert_eq!(record.as_bytes().as_ptr(), ptr);
            assert_eq!(id.index(), k as usize);
        }
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let mut table = HashTable::new(4, 4);
        let (existed, mut record) = table.find_or_create(&key4(42));
        assert!(!existed);
        record.value_mut().copy_from_slice(&7u32.to_le_bytes());
        let id = record.id();
        let ptr = record.as_bytes().as_ptr();

        let (existed, record) = table.find_or_create(&key4(42));
        assert!(existed);
        assert_eq!(record.id(), id);
        assert_eq!(record.as_bytes().as_ptr(), ptr);
        assert_eq!(record.value(), 7u32.to_le_bytes());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn fresh_value_region_is_zeroed() {
        let mut table = HashTable::new(2, 16);
        let (_, record) = table.find_or_create(&[1, 2]);
        assert_eq!(record.key(), [1, 2]);
        assert_eq!(record.value(), [0u8; 16]);
        assert_eq!(record.as_bytes().len(), 18);
    }

    #[test]
    fn growth_fires_on_fifteenth_insert() {
        let mut table = HashTable::with_block_count(4, 4, 1);
        assert_eq!(table.capacity(), 14);

        for k in 0..14u32 {
            table.find_or_create(&key4(k));
            assert_eq!(table.block_count(), 1, "grew early after key {k}");
        }
        table.find_or_create(&key4(14));
        assert_eq!(table.block_count(), 4);
        assert_eq!(table.len(), 15);

        for k in 0..15u32 {
            assert!(table.find(&key4(k)).is_some(), "lost key {k}");
        }
        assert!(table.find(&key4(15)).is_none());
        assert_invariants(&table);
    }

    #[test]
    fn growth_quadruples_and_keeps_every_key() {
        let mut table = HashTable::with_hasher(4, 0, SipKeyHasher::random());
        let mut block_count = table.block_count();
        let mut growths = 0;

        for k in 0..20_000u32 {
            table.find_or_create(&key4(k));
            if table.block_count() != block_count {
                assert_eq!(table.block_count(), block_count * GROWTH_FACTOR);
                block_count = table.block_count();
                growths += 1;

                for prior in 0..=k {
                    assert!(table.find(&key4(prior)).is_some(), "lost key {prior}");
                }
            }
            assert!(table.len() <= table.capacity());
        }

        assert!(growths >= 3);
        assert_invariants(&table);
    }

    #[test]
    fn load_factor_bound_holds_after_every_insert() {
        let mut table = HashTable::with_block_count(8, 0, 1);
        for k in 0..5_000u64 {
            table.find_or_create(&k.to_le_bytes());
            let slots = table.slot_count();
            assert!(table.len() * 10 <= slots * 9, "{} / {}", table.len(), slots);
        }
    }

    #[test]
    fn tag_collision_is_rejected_by_key_compare() {
        // Every key hashes identically: same home block, same tag.
        let mut table = HashTable::with_hasher(4, 0, ConstantHasher(0x1234_5678_9ABC_DE42));
        table.find_or_create(&key4(1));
        table.find_or_create(&key4(2));

        assert!(table.find(&key4(1)).is_some());
        assert!(table.find(&key4(2)).is_some());
        assert!(table.find(&key4(3)).is_none());
    }

    #[test]
    fn tag_collision_with_real_hash() {
        // Find two keys whose xxh3 tags collide and that share a home block.
        let table = HashTable::with_block_count(4, 0, 1);
        let inserted = key4(0);
        let tag = hashtag(table.hasher().hash_key(&inserted));
        let colliding = (1..u32::MAX)
            .map(key4)
            .find(|key| hashtag(table.hasher().hash_key(key)) == tag)
            .unwrap();

        let mut table = table;
        table.find_or_create(&inserted);
        let block = &table.blocks[0];
        assert!(block.scan(tag).matches.any());

        assert!(table.find(&colliding).is_none());
        assert!(table.find(&inserted).is_some());
    }

    #[test]
    fn explicit_collision_spills_across_blocks() {
        let mut table = HashTable::with_hasher(8, 8, ConstantHasher(0));
        for k in 0..65u64 {
            let (existed, mut record) = table.find_or_create(&k.to_le_bytes());
            assert!(!existed);
            record.value_mut().copy_from_slice(&k.to_be_bytes());
        }

        assert_eq!(table.len(), 65);
        for k in 0..65u64 {
            assert_eq!(
                table.find(&k.to_le_bytes()).map(|r| r.value()),
                Some(&k.to_be_bytes()[..]),
                "{:#?}",
                table
            );
        }
        assert!(table.stats().max_probe_distance() >= 4);
        assert_invariants(&table);
    }

    #[test]
    fn probe_wraps_past_last_block() {
        // Home block is the last one; overflow must wrap to block 0.
        let mut table = HashTable::with_hasher(8, 0, IdentityHasher);
        let last = (DEFAULT_BLOCK_COUNT as u64 - 1) << 7;
        for k in 0..20u64 {
            table.find_or_create(&(last | (k << 32)).to_le_bytes());
        }
        assert_eq!(table.block_count(), DEFAULT_BLOCK_COUNT);
        assert!(table.blocks[0].occupied().count() > 0);

        for k in 0..20u64 {
            assert!(table.find(&(last | (k << 32)).to_le_bytes()).is_some());
        }
    }

    #[test]
    fn value_writes_do_not_affect_lookup() {
        let mut table = HashTable::with_block_count(4, 4, 1);
        for k in 0..100u32 {
            table.find_or_create(&key4(k));
        }
        for k in 0..100u32 {
            table
                .find_mut(&key4(k))
                .unwrap()
                .value_mut()
                .copy_from_slice(&key4(k + 1));
        }

        for k in 0..100u32 {
            let record = table.find(&key4(k)).unwrap();
            assert_eq!(record.key(), key4(k));
            assert_eq!(record.value(), key4(k + 1));
        }
        assert!(table.find(&key4(100)).is_none());
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn wrong_key_size_is_reported() {
        let mut table = HashTable::new(4, 4);
        table.find_or_create(&key4(1));

        let err = Error::KeySize {
            expected: 4,
            actual: 5,
        };
        assert_eq!(table.try_find(&[0; 5]).unwrap_err(), err);
        assert_eq!(table.try_find_mut(&[0; 5]).unwrap_err(), err);
        assert!(table.try_find_or_create(&[0; 5]).is_err());
        assert!(table.try_find_or_create(&[]).is_err());
        assert_eq!(table.len(), 1);

        let (existed, _) = table.try_find_or_create(&key4(1)).unwrap();
        assert!(existed);
    }

    #[test]
    #[should_panic(expected = "key is 3 bytes, table expects 4")]
    fn find_panics_on_short_key() {
        let table = HashTable::new(4, 0);
        table.find(&[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "key is 5 bytes, table expects 4")]
    fn find_or_create_panics_on_long_key() {
        let mut table = HashTable::new(4, 0);
        table.find_or_create(&[1, 2, 3, 4, 5]);
    }

    #[test]
    fn construction_is_checked() {
        assert_eq!(
            HashTable::try_with_block_count_and_hasher(0, 4, 1, Xxh3).unwrap_err(),
            Error::ZeroKeySize
        );
        assert_eq!(
            HashTable::try_with_block_count_and_hasher(4, 4, 0, Xxh3).unwrap_err(),
            Error::BlockCount(0)
        );
        assert_eq!(
            HashTable::try_with_block_count_and_hasher(4, 4, 12, Xxh3).unwrap_err(),
            Error::BlockCount(12)
        );
        assert_eq!(
            HashTable::try_with_block_count_and_hasher(4, usize::MAX - 3, 1, Xxh3).unwrap_err(),
            Error::RecordSize {
                key_size: 4,
                value_size: usize::MAX - 3
            }
        );
        assert!(HashTable::try_with_block_count_and_hasher(4, usize::MAX - 4, 1, Xxh3).is_ok());

        let table = HashTable::try_with_block_count_and_hasher(4, 0, 64, Xxh3).unwrap();
        assert_eq!(table.block_count(), 64);
        assert_eq!(table.value_size(), 0);
        assert!(table.blocks.iter().all(|b| b.empty_slots().count() == BLOCK_SLOTS));
    }

    #[test]
    #[should_panic(expected = "key size must be non-zero")]
    fn zero_key_size_panics() {
        HashTable::new(0, 4);
    }

    #[test]
    fn with_capacity_avoids_growth() {
        for records in [0usize, 1, 14, 15, 100, 1000, 12345] {
            let mut table = HashTable::with_capacity(4, 0, records);
            assert!(table.capacity() >= records);
            let block_count = table.block_count();
            for k in 0..records as u32 {
                table.find_or_create(&key4(k));
            }
            assert_eq!(table.block_count(), block_count, "grew with {records} records");
        }
    }

    #[test]
    fn with_capacity_and_hasher_matches_with_capacity() {
        for records in [0usize, 14, 15, 1000] {
            let plain = HashTable::with_capacity(4, 0, records);
            let keyed = HashTable::with_capacity_and_hasher(4, 0, records, ConstantHasher(0));
            assert_eq!(keyed.block_count(), plain.block_count());
            assert_eq!(keyed.capacity(), plain.capacity());
        }

        let mut table = HashTable::with_capacity_and_hasher(4, 0, 40, ConstantHasher(0x155));
        for k in 0..40u32 {
            table.find_or_create(&key4(k));
        }
        assert_eq!(table.block_count(), 4);
        assert_invariants(&table);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut table = HashTable::with_block_count(4, 0, 1);
        let keys: Vec<u32> = (0..200).map(|k| k * 7919 % 1000).collect();
        for &k in &keys {
            table.find_or_create(&key4(k));
        }

        let mut expected = Vec::new();
        for &k in &keys {
            if !expected.contains(&k) {
                expected.push(k);
            }
        }
        let iterated: Vec<u32> = table
            .iter()
            .map(|r| u32::from_le_bytes(r.key().try_into().unwrap()))
            .collect();
        assert_eq!(iterated, expected);
        assert_eq!(table.iter().len(), table.len());
        assert_eq!((&table).into_iter().count(), table.len());

        for (i, record) in table.iter().enumerate() {
            assert_eq!(record.id().index(), i);
        }
    }

    #[test]
    fn get_by_id() {
        let mut table = HashTable::new(4, 4);
        let (_, record) = table.find_or_create(&key4(5));
        let id = record.id();

        table.get_mut(id).unwrap().value_mut()[0] = 9;
        assert_eq!(table.get(id).unwrap().value(), [9, 0, 0, 0]);
        assert_eq!(table.get(id).unwrap().key(), key4(5));
        assert!(table.get(RecordId(1)).is_none());
        assert!(table.get_mut(RecordId(1)).is_none());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let mut table = HashTable::with_hasher(8, 8, SipKeyHasher::random());
        for k in 0..100_000u64 {
            let (existed, mut record) = table.find_or_create(&k.to_le_bytes());
            assert!(!existed);
            record.value_mut().copy_from_slice(&(!k).to_le_bytes());
        }

        assert_eq!(table.len(), 100_000);
        for k in 0..100_000u64 {
            assert_eq!(
                table.find(&k.to_le_bytes()).map(|r| r.value()),
                Some(&(!k).to_le_bytes()[..])
            );
        }
        for k in 100_000..101_000u64 {
            assert!(table.find(&k.to_le_bytes()).is_none());
        }
        assert_invariants(&table);
    }

    #[test]
    fn stats_account_for_every_record() {
        let mut table = HashTable::with_hasher(4, 4, SipKeyHasher::random());
        for k in 0..1000u32 {
            table.find_or_create(&key4(k));
        }

        let stats = table.stats();
        assert_eq!(stats.records, 1000);
        assert_eq!(stats.block_count, table.block_count());
        assert_eq!(stats.slot_count, table.block_count() * BLOCK_SLOTS);
        assert_eq!(stats.probe_histogram.iter().sum::<usize>(), 1000);
        assert_eq!(stats.record_bytes, 8000);
        assert!(stats.load_factor <= 0.9);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[cfg(feature = "std")]
    fn stats_output() {
        let mut table = HashTable::new(8, 0);
        for k in 0..10_000u64 {
            table.find_or_create(&k.to_le_bytes());
        }
        table.stats().print();
    }
}
