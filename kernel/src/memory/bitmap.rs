//! Allocation bitmap for the frame allocator
//!
//! One bit per frame, 1 = allocated. Sized for [`MAX_BITS`] frames, which
//! covers the whole paging region of the board.

use super::layout::PAGING_PAGES;

/// Bits tracked by one bitmap (rounded up to whole chunks)
pub const MAX_BITS: usize = CHUNKS * 64;
const CHUNKS: usize = PAGING_PAGES.div_ceil(64);

pub struct Bitmap {
    chunks: [u64; CHUNKS],
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bitmap {
    pub const fn new() -> Self {
        Bitmap { chunks: [0u64; CHUNKS] }
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        (self.chunks[index / 64] & (1u64 << (index % 64))) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.chunks[index / 64] |= 1u64 << (index % 64);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        self.chunks[index / 64] &= !(1u64 << (index % 64));
    }

    /// Lowest clear bit below `max`
    ///
    /// Full chunks are skipped a word at a time.
    pub fn find_first_unset(&self, max: usize) -> Option<usize> {
        let max = max.min(MAX_BITS);
        for (chunk_idx, &chunk) in self.chunks.iter().enumerate() {
            let base = chunk_idx * 64;
            if base >= max {
                break;
            }
            if chunk == !0 {
                continue;
            }
            let idx = base + chunk.trailing_ones() as usize;
            return (idx < max).then_some(idx);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let bm = Bitmap::new();
        for i in 0..1000 {
            assert!(!bm.is_set(i));
        }
    }

    #[test]
    fn test_set_clear() {
        let mut bm = Bitmap::new();
        bm.set(0);
        bm.set(500);
        bm.set(10000);
        assert!(bm.is_set(0));
        assert!(bm.is_set(500));
        assert!(bm.is_set(10000));

        bm.clear(500);
        assert!(!bm.is_set(500));
        assert!(bm.is_set(0));
    }

    #[test]
    fn test_find_skips_full_chunks() {
        let mut bm = Bitmap::new();
        assert_eq!(bm.find_first_unset(MAX_BITS), Some(0));

        for i in 0..130 {
            bm.set(i);
        }
        assert_eq!(bm.find_first_unset(MAX_BITS), Some(130));

        bm.clear(64);
        assert_eq!(bm.find_first_unset(MAX_BITS), Some(64));
    }

    #[test]
    fn test_find_respects_limit() {
        let mut bm = Bitmap::new();
        for i in 0..8 {
            bm.set(i);
        }
        assert_eq!(bm.find_first_unset(8), None);
        assert_eq!(bm.find_first_unset(9), Some(8));
    }
}
