//! K-mer window ↔ integer index in `[0, alphabet_size^kmer_size)`.
//!
//! The first residue of a window is the most significant digit.

use crate::encode::Alphabet;
use crate::index::IndexError;

#[derive(Clone, Debug)]
pub struct Indexer {
    alphabet_size: usize,
    kmer_size: usize,
    // alphabet_size^(kmer_size - 1 - i) for window position i
    powers: Vec<u64>,
    table_size: usize,
}

impl Indexer {
    /// Fails when the k-mer space does not fit the `u32` index type.
    pub fn new(alphabet_size: usize, kmer_size: usize) -> Result<Self, IndexError> {
        if alphabet_size < 2 || alphabet_size > 256 {
            return Err(IndexError::InvalidAlphabet(alphabet_size));
        }
        if kmer_size == 0 {
            return Err(IndexError::InvalidKmerSize(kmer_size));
        }
        let table_size = (alphabet_size as u64)
            .checked_pow(kmer_size as u32)
            .filter(|&n| n <= u32::MAX as u64)
            .ok_or(IndexError::TableTooLarge {
                alphabet_size,
                kmer_size,
            })?;
        let mut powers = vec![1u64; kmer_size];
        for i in (0..kmer_size.saturating_sub(1)).rev() {
            powers[i] = powers[i + 1] * alphabet_size as u64;
        }
        Ok(Indexer {
            alphabet_size,
            kmer_size,
            powers,
            table_size: table_size as usize,
        })
    }

    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    #[inline]
    pub fn kmer_size(&self) -> usize {
        self.kmer_size
    }

    /// `alphabet_size^kmer_size`.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Index of a window of exactly `kmer_size` codes.
    #[inline]
    pub fn int2index(&self, window: &[u8]) -> u32 {
        debug_assert_eq!(window.len(), self.kmer_size);
        let mut idx: u64 = 0;
        for &c in window {
            idx = idx * self.alphabet_size as u64 + c as u64;
        }
        idx as u32
    }

    /// Weight of the residue at window position `pos`.
    #[inline]
    pub fn power(&self, pos: usize) -> u64 {
        self.powers[pos]
    }

    /// Inverse of [`int2index`](Self::int2index); writes `kmer_size` codes to `out`.
    pub fn index2int(&self, index: u32, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.kmer_size);
        let mut rest = index as u64;
        for slot in out.iter_mut().rev() {
            *slot = (rest % self.alphabet_size as u64) as u8;
            rest /= self.alphabet_size as u64;
        }
    }

    /// Human-readable k-mer, for diagnostics.
    pub fn kmer_string(&self, index: u32, alphabet: &Alphabet) -> String {
        let mut codes = vec![0u8; self.kmer_size];
        self.index2int(index, &mut codes);
        String::from_utf8_lossy(&alphabet.decode(&codes)).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_base_alphabet_number() {
        let ix = Indexer::new(4, 2).unwrap();
        assert_eq!(ix.table_size(), 16);
        assert_eq!(ix.int2index(&[0, 1]), 1);
        assert_eq!(ix.int2index(&[1, 2]), 6);
        assert_eq!(ix.int2index(&[3, 3]), 15);
    }

    #[test]
    fn index2int_inverts() {
        let ix = Indexer::new(21, 3).unwrap();
        let mut out = [0u8; 3];
        for idx in [0u32, 1, 20, 21, 441, 9260] {
            ix.index2int(idx, &mut out);
            assert_eq!(ix.int2index(&out), idx);
        }
    }

    #[test]
    fn kmer_string_decodes() {
        let ix = Indexer::new(4, 3).unwrap();
        let idx = ix.int2index(&[2, 0, 3]);
        assert_eq!(ix.kmer_string(idx, &Alphabet::nucleotide()), "GAT");
    }

    #[test]
    fn rejects_oversized_space() {
        assert!(matches!(
            Indexer::new(21, 8),
            Err(IndexError::TableTooLarge { .. })
        ));
        assert!(Indexer::new(21, 7).is_ok());
    }
}
