//! Hash functions used to place keys in a [`HashTable`].
//!
//! The table hashes raw key bytes, so hashers implement [`KeyHasher`] rather
//! than `core::hash::BuildHasher`: a `Hasher` fed through `Hash for [u8]`
//! would mix in a length prefix, and every key in a table already has the
//! same length.
//!
//! [`HashTable`]: crate::HashTable

/// Hashes a fixed-size key to 64 bits.
///
/// The table draws the slot tag from the low seven bits and the home block
/// from the bits above them, so implementations should avalanche well across
/// the whole word.
pub trait KeyHasher {
    /// Hash exactly the bytes of `key`.
    fn hash_key(&self, key: &[u8]) -> u64;
}

impl<H: KeyHasher + ?Sized> KeyHasher for &H {
    #[inline(always)]
    fn hash_key(&self, key: &[u8]) -> u64 {
        (**self).hash_key(key)
    }
}

/// XXH3 (64-bit), the default key hasher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3;

impl KeyHasher for Xxh3 {
    #[inline(always)]
    fn hash_key(&self, key: &[u8]) -> u64 {
        xxhash_rust::xxh3::xxh3_64(key)
    }
}

/// foldhash's fast variant with a fixed seed.
///
/// Faster than [`Xxh3`] on short keys, with weaker avalanche guarantees.
#[cfg(feature = "foldhash")]
#[derive(Clone)]
pub struct FoldHash {
    state: foldhash::fast::FixedState,
}

#[cfg(feature = "foldhash")]
impl FoldHash {
    /// Creates a hasher seeded with `seed`.
    pub const fn with_seed(seed: u64) -> Self {
        Self {
            state: foldhash::fast::FixedState::with_seed(seed),
        }
    }
}

#[cfg(feature = "foldhash")]
impl Default for FoldHash {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

#[cfg(feature = "foldhash")]
impl core::fmt::Debug for FoldHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FoldHash").finish_non_exhaustive()
    }
}

#[cfg(feature = "foldhash")]
impl KeyHasher for FoldHash {
    #[inline(always)]
    fn hash_key(&self, key: &[u8]) -> u64 {
        use core::hash::BuildHasher;
        use core::hash::Hasher;

        let mut hasher = self.state.build_hasher();
        hasher.write(key);
        hasher.finish()
    }
}
