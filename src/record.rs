use core::fmt::Debug;

/// Stable identity of a record within one [`HashTable`].
///
/// Ids are assigned in insertion order starting at zero and never change,
/// including across growth.
///
/// [`HashTable`]: crate::HashTable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub(crate) usize);

impl RecordId {
    /// Position of the record in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Shared view of a record: `key_size` key bytes followed by `value_size`
/// value bytes.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    id: RecordId,
    bytes: &'a [u8],
    key_size: usize,
}

impl<'a> Record<'a> {
    pub(crate) fn new(id: RecordId, bytes: &'a [u8], key_size: usize) -> Self {
        debug_assert!(key_size <= bytes.len());
        Self {
            id,
            bytes,
            key_size,
        }
    }

    /// The record's stable id.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The key bytes the record was created with.
    pub fn key(&self) -> &'a [u8] {
        &self.bytes[..self.key_size]
    }

    /// The caller-managed value bytes.
    pub fn value(&self) -> &'a [u8] {
        &self.bytes[self.key_size..]
    }

    /// The whole record, key then value.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Debug for Record<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id.0)
            .field("key", &self.key())
            .field("value", &self.value())
            .finish()
    }
}

/// Mutable view of a record.
///
/// Only the value region is writable; the key is fixed at creation.
pub struct RecordMut<'a> {
    id: RecordId,
    bytes: &'a mut [u8],
    key_size: usize,
}

impl<'a> RecordMut<'a> {
    pub(crate) fn new(id: RecordId, bytes: &'a mut [u8], key_size: usize) -> Self {
        debug_assert!(key_size <= bytes.len());
        Self {
            id,
            bytes,
            key_size,
        }
    }

    /// The record's stable id.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The key bytes the record was created with.
    pub fn key(&self) -> &[u8] {
        &self.bytes[..self.key_size]
    }

    /// The caller-managed value bytes.
    pub fn value(&self) -> &[u8] {
        &self.bytes[self.key_size..]
    }

    /// Writable value bytes. Freshly created records start zero-filled.
    pub fn value_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.key_size..]
    }

    /// Converts the handle into the writable value bytes with the handle's
    /// full lifetime.
    pub fn into_value_mut(self) -> &'a mut [u8] {
        &mut self.bytes[self.key_size..]
    }

    /// The whole record, key then value.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Reborrows as a shared [`Record`].
    pub fn as_record(&self) -> Record<'_> {
        Record::new(self.id, self.bytes, self.key_size)
    }
}

impl Debug for RecordMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_record().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_value_split() {
        let mut bytes = [1u8, 2, 3, 4, 0, 0];
        let mut record = RecordMut::new(RecordId(9), &mut bytes, 4);
        assert_eq!(record.key(), [1, 2, 3, 4]);
        assert_eq!(record.value(), [0, 0]);

        record.value_mut().copy_from_slice(&[7, 8]);
        assert_eq!(record.as_record().value(), [7, 8]);
        assert_eq!(record.as_bytes(), [1, 2, 3, 4, 7, 8]);

        let value = record.into_value_mut();
        value[0] = 42;
        assert_eq!(bytes, [1, 2, 3, 4, 42, 8]);
    }

    #[test]
    fn zero_sized_value() {
        let bytes = [5u8, 6];
        let record = Record::new(RecordId(0), &bytes, 2);
        assert_eq!(record.key(), [5, 6]);
        assert!(record.value().is_empty());
        assert_eq!(record.id().index(), 0);
    }
}
