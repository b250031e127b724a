use core::fmt::Debug;

/// Number of slots per block. A block's tags fill exactly one SSE2 register,
/// so a single compare covers the whole block.
pub(crate) const BLOCK_SLOTS: usize = 16;

/// Special tag value marking an empty slot.
///
/// Occupied slots only ever carry the low seven bits of the hash, so `EMPTY`
/// is the only tag with the sign bit set. SSE2 `movemask` over the raw tags
/// therefore yields the empty lanes directly.
pub(crate) const EMPTY: u8 = 0x80;

/// Tag stored alongside a record: the low byte of the hash with the sign bit
/// cleared.
#[inline(always)]
pub(crate) fn hashtag(hash: u64) -> u8 {
    ((hash & 0xFF) & 0x7F) as u8
}

/// First block visited when probing for `hash`. Bits below the tag are
/// skipped so the tag and the block index are drawn from different bits.
#[inline(always)]
pub(crate) fn home_index(hash: u64, block_mask: usize) -> usize {
    (hash >> 7) as usize & block_mask
}

/// A 16-lane bitmask produced by a block scan. Bit `i` corresponds to slot
/// `i`.
///
/// Iterating yields the set lanes from lowest to highest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitMask(u16);

impl BitMask {
    #[cfg(any(test, feature = "stats"))]
    #[inline(always)]
    pub(crate) fn any(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub(crate) fn lowest(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    #[cfg(test)]
    pub(crate) fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    #[cfg(test)]
    pub(crate) fn bits(self) -> u16 {
        self.0
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let index = self.lowest()?;
        self.0 &= self.0 - 1;
        Some(index)
    }
}

impl Debug for BitMask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:016b}", self.0)
    }
}

/// Result of comparing one block's tags against a query tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TagScan {
    /// Slots whose tag equals the query tag.
    pub(crate) matches: BitMask,
    /// Slots that are still empty.
    pub(crate) empties: BitMask,
}

/// A 16-slot probing unit.
///
/// `tags` sits at offset zero of a 16-byte aligned struct so it can be loaded
/// with an aligned SSE2 load. `slots[i]` holds the index of the record that
/// owns slot `i` and is meaningless while `tags[i] == EMPTY`.
#[derive(Clone, Copy)]
#[repr(C, align(16))]
pub(crate) struct Block {
    tags: [u8; BLOCK_SLOTS],
    slots: [usize; BLOCK_SLOTS],
}

impl Block {
    pub(crate) const fn new() -> Self {
        Block {
            tags: [EMPTY; BLOCK_SLOTS],
            slots: [0; BLOCK_SLOTS],
        }
    }

    /// Record index held by `slot`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `slot < BLOCK_SLOTS` and that the slot is
    /// occupied.
    #[inline(always)]
    pub(crate) unsafe fn record(&self, slot: usize) -> usize {
        // SAFETY: Caller ensures `slot` is within bounds of the slots array
        unsafe {
            debug_assert!(*self.tags.get_unchecked(slot) != EMPTY);
            *self.slots.get_unchecked(slot)
        }
    }

    /// Claim an empty slot for record `record` with tag `tag`.
    #[inline(always)]
    pub(crate) fn occupy(&mut self, slot: usize, tag: u8, record: usize) {
        debug_assert!(tag != EMPTY);
        debug_assert!(self.tags[slot] == EMPTY);
        self.tags[slot] = tag;
        self.slots[slot] = record;
    }

    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        (0..BLOCK_SLOTS)
            .filter(|&slot| self.tags[slot] != EMPTY)
            .map(|slot| self.slots[slot])
    }

    #[cfg(test)]
    pub(crate) fn tags(&self) -> &[u8; BLOCK_SLOTS] {
        &self.tags
    }

    /// Portable version of `scan`. Produces bit-for-bit the same masks as the
    /// SSE2 path.
    #[cfg_attr(
        all(target_arch = "x86_64", target_feature = "sse2", not(test)),
        allow(dead_code)
    )]
    #[inline(always)]
    pub(crate) fn scan_generic(&self, tag: u8) -> TagScan {
        let mut matches: u16 = 0;
        let mut empties: u16 = 0;
        for (i, &t) in self.tags.iter().enumerate() {
            if t == tag {
                matches |= 1 << i;
            }
            if t == EMPTY {
                empties |= 1 << i;
            }
        }
        TagScan {
            matches: BitMask(matches),
            empties: BitMask(empties),
        }
    }

    #[cfg_attr(
        all(target_arch = "x86_64", target_feature = "sse2", not(test)),
        allow(dead_code)
    )]
    #[inline(always)]
    pub(crate) fn empty_slots_generic(&self) -> BitMask {
        let mut empties: u16 = 0;
        for (i, &t) in self.tags.iter().enumerate() {
            if t == EMPTY {
                empties |= 1 << i;
            }
        }
        BitMask(empties)
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
        impl Block {
            /// Compare every tag in the block against `tag` and against
            /// `EMPTY` in one pass.
            #[inline(always)]
            pub(crate) fn scan(&self, tag: u8) -> TagScan {
                use core::arch::x86_64::*;
                // SAFETY: `Block` is `#[repr(C, align(16))]` with `tags` at
                // offset 0, so the 16 tag bytes are 16-byte aligned and
                // `_mm_load_si128` is in bounds.
                unsafe {
                    let data = _mm_load_si128(self.tags.as_ptr() as *const __m128i);
                    let cmp = _mm_cmpeq_epi8(data, _mm_set1_epi8(tag as i8));
                    TagScan {
                        matches: BitMask(_mm_movemask_epi8(cmp) as u16),
                        empties: BitMask(_mm_movemask_epi8(data) as u16),
                    }
                }
            }

            #[inline(always)]
            pub(crate) fn empty_slots(&self) -> BitMask {
                use core::arch::x86_64::*;
                // SAFETY: See `scan`; the load is aligned and in bounds.
                unsafe {
                    let data = _mm_load_si128(self.tags.as_ptr() as *const __m128i);
                    BitMask(_mm_movemask_epi8(data) as u16)
                }
            }
        }
    } else {
        impl Block {
            /// Compare every tag in the block against `tag` and against
            /// `EMPTY` in one pass.
            #[inline(always)]
            pub(crate) fn scan(&self, tag: u8) -> TagScan {
                self.scan_generic(tag)
            }

            #[inline(always)]
            pub(crate) fn empty_slots(&self) -> BitMask {
                self.empty_slots_generic()
            }
        }
    }
}

impl Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for (tag, slot) in self.tags.iter().zip(self.slots.iter()) {
            if *tag == EMPTY {
                list.entry(&format_args!(".."));
            } else {
                list.entry(&format_args!("{:02x}@{}", tag, slot));
            }
        }
        list.finish()
    }
}
