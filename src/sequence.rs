//! Sequence view: encoded residues plus a restartable k-mer window cursor.

/// One encoded sequence, viewed through fixed-length k-mer windows.
///
/// The cursor (`reset_position` / `has_next_kmer` / `next_kmer`) is what the
/// index passes walk; [`Sequence::kmers`] is the iterator form of the same walk.
#[derive(Clone, Debug)]
pub struct Sequence<'a> {
    id: u32,
    codes: &'a [u8],
    kmer_size: usize,
    // start of the next window
    next_pos: usize,
}

impl<'a> Sequence<'a> {
    pub fn new(id: u32, codes: &'a [u8], kmer_size: usize) -> Self {
        debug_assert!(kmer_size > 0);
        Sequence {
            id,
            codes,
            kmer_size,
            next_pos: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn codes(&self) -> &'a [u8] {
        self.codes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    #[inline]
    pub fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    /// Number of windows a full walk yields.
    #[inline]
    pub fn window_count(&self) -> usize {
        (self.codes.len() + 1).saturating_sub(self.kmer_size)
    }

    /// Start position of the last window, `None` when there is no window.
    #[inline]
    pub fn last_window_start(&self) -> Option<usize> {
        self.window_count().checked_sub(1)
    }

    /// Rewind the cursor to the first window.
    #[inline]
    pub fn reset_position(&mut self) {
        self.next_pos = 0;
    }

    #[inline]
    pub fn has_next_kmer(&self) -> bool {
        self.next_pos + self.kmer_size <= self.codes.len()
    }

    /// Advance the cursor and return the window it now points at.
    ///
    /// Panics when called without a preceding successful `has_next_kmer`.
    #[inline]
    pub fn next_kmer(&mut self) -> &'a [u8] {
        let start = self.next_pos;
        self.next_pos += 1;
        &self.codes[start..start + self.kmer_size]
    }

    /// Start position of the window last returned by `next_kmer`.
    #[inline]
    pub fn current_position(&self) -> usize {
        self.next_pos.saturating_sub(1)
    }

    /// Fresh `(position, window)` iterator; does not touch the cursor.
    pub fn kmers(&self) -> KmerWindows<'a> {
        KmerWindows {
            inner: self.codes.windows(self.kmer_size).enumerate(),
        }
    }
}

/// Iterator over the k-mer windows of a [`Sequence`].
pub struct KmerWindows<'a> {
    inner: std::iter::Enumerate<std::slice::Windows<'a, u8>>,
}

impl<'a> Iterator for KmerWindows<'a> {
    type Item = (usize, &'a [u8]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for KmerWindows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_walks_all_windows_and_restarts() {
        let codes = [0u8, 1, 2, 3];
        let mut s = Sequence::new(7, &codes, 2);
        let mut seen = Vec::new();
        while s.has_next_kmer() {
            let w = s.next_kmer().to_vec();
            seen.push((s.current_position(), w));
        }
        assert_eq!(
            seen,
            vec![(0, vec![0, 1]), (1, vec![1, 2]), (2, vec![2, 3])]
        );

        s.reset_position();
        assert!(s.has_next_kmer());
        assert_eq!(s.next_kmer(), &[0, 1]);
        assert_eq!(s.current_position(), 0);
    }

    #[test]
    fn iterator_matches_cursor() {
        let codes = [3u8, 3, 1, 0, 2];
        let s = Sequence::new(0, &codes, 3);
        assert_eq!(s.window_count(), 3);
        assert_eq!(s.kmers().len(), 3);
        let positions: Vec<usize> = s.kmers().map(|(p, _)| p).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn short_sequence_has_no_windows() {
        let codes = [1u8];
        let s = Sequence::new(0, &codes, 2);
        assert!(!s.has_next_kmer());
        assert_eq!(s.window_count(), 0);
        assert_eq!(s.last_window_start(), None);
        assert_eq!(s.kmers().count(), 0);
    }
}
