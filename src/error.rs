/// Errors reported by the checked (`try_*`) table operations.
///
/// The non-`try` operations treat the same conditions as caller contract
/// violations and panic with this error's message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A key did not have exactly the table's key size.
    #[error("key is {actual} bytes, table expects {expected}")]
    KeySize {
        /// The table's fixed key size.
        expected: usize,
        /// Length of the key that was passed in.
        actual: usize,
    },
    /// A table was requested with a zero-byte key.
    #[error("key size must be non-zero")]
    ZeroKeySize,
    /// A table was requested with a block count that is zero or not a power
    /// of two.
    #[error("block count {0} is not a non-zero power of two")]
    BlockCount(usize),
    /// `key_size + value_size` does not fit in a `usize`.
    #[error("record size {key_size} + {value_size} overflows usize")]
    RecordSize {
        /// Requested key size.
        key_size: usize,
        /// Requested value size.
        value_size: usize,
    },
}
