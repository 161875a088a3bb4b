//! Integer substitution scores indexed by residue-pair code.
//!
//! Used by the similar-k-mer expander and by the diagonal-score filter that
//! keeps low-information windows out of the index.

use crate::index::IndexError;

/// BLOSUM62 in `ARNDCQEGHILKMFPSTWYV` order (20×20).
#[rustfmt::skip]
const BLOSUM62_20: [[i8; 20]; 20] = [
    //A   R   N   D   C   Q   E   G   H   I   L   K   M   F   P   S   T   W   Y   V
    [ 4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0], // A
    [-1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3], // R
    [-2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3], // N
    [-2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3], // D
    [ 0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1], // C
    [-1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2], // Q
    [-1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2], // E
    [ 0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3], // G
    [-2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3], // H
    [-1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3], // I
    [-1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1], // L
    [-1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2], // K
    [-1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1], // M
    [-2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1], // F
    [-1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2], // P
    [ 1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2], // S
    [ 0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0], // T
    [-3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3], // W
    [-2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1], // Y
    [ 0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4], // V
];

/// Score of `X` against anything, itself included.
const BLOSUM62_X: i8 = -1;

/// Square score table over an alphabet of `alphabet_size` codes.
#[derive(Clone, Debug)]
pub struct SubstitutionMatrix {
    alphabet_size: usize,
    scores: Vec<i8>,
}

impl SubstitutionMatrix {
    /// Row-major `alphabet_size × alphabet_size` table.
    pub fn from_scores(alphabet_size: usize, scores: Vec<i8>) -> Result<Self, IndexError> {
        if scores.len() != alphabet_size * alphabet_size {
            return Err(IndexError::Inconsistent(format!(
                "score table has {} cells, expected {}",
                scores.len(),
                alphabet_size * alphabet_size
            )));
        }
        Ok(SubstitutionMatrix {
            alphabet_size,
            scores,
        })
    }

    /// BLOSUM62 over [`Alphabet::amino_acid`](crate::encode::Alphabet::amino_acid).
    pub fn blosum62() -> Self {
        let n = 21;
        let mut scores = vec![BLOSUM62_X; n * n];
        for (i, row) in BLOSUM62_20.iter().enumerate() {
            scores[i * n..i * n + 20].copy_from_slice(row);
        }
        SubstitutionMatrix {
            alphabet_size: n,
            scores,
        }
    }

    /// Match/mismatch scores over [`Alphabet::nucleotide`](crate::encode::Alphabet::nucleotide).
    pub fn nucleotide(match_score: i8, mismatch: i8) -> Self {
        let n = 4;
        let scores = (0..n * n)
            .map(|c| if c / n == c % n { match_score } else { mismatch })
            .collect();
        SubstitutionMatrix {
            alphabet_size: n,
            scores,
        }
    }

    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    #[inline]
    pub fn score(&self, a: u8, b: u8) -> i32 {
        self.scores[a as usize * self.alphabet_size + b as usize] as i32
    }

    /// Self score of every residue.
    pub fn diagonal_scores(&self) -> Vec<i8> {
        (0..self.alphabet_size)
            .map(|i| self.scores[i * self.alphabet_size + i])
            .collect()
    }

    /// Best score reachable from each residue.
    pub fn row_max(&self) -> Vec<i32> {
        self.scores
            .chunks_exact(self.alphabet_size)
            .map(|row| row.iter().copied().max().unwrap_or(0) as i32)
            .collect()
    }
}

/// Sum of per-residue diagonal scores over a window.
#[inline]
pub fn window_diagonal_score(window: &[u8], diagonal: &[i8]) -> i32 {
    window.iter().map(|&c| diagonal[c as usize] as i32).sum()
}

/// The admission test shared by counting and filling: a positive threshold
/// drops windows scoring below it; zero or negative disables the filter.
#[inline]
pub(crate) fn passes_threshold(window: &[u8], threshold: i32, diagonal: &[i8]) -> bool {
    threshold <= 0 || window_diagonal_score(window, diagonal) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blosum62_is_symmetric() {
        let m = SubstitutionMatrix::blosum62();
        for a in 0..21u8 {
            for b in 0..21u8 {
                assert_eq!(m.score(a, b), m.score(b, a), "{a},{b}");
            }
        }
        // W/W and C/C are the two largest diagonal cells.
        let d = m.diagonal_scores();
        assert_eq!(d[17], 11);
        assert_eq!(d[4], 9);
        assert_eq!(d[20], -1);
    }

    #[test]
    fn diagonal_filter() {
        let m = SubstitutionMatrix::nucleotide(2, -3);
        let d = m.diagonal_scores();
        assert_eq!(window_diagonal_score(&[0, 1, 2], &d), 6);
        assert!(passes_threshold(&[0, 1, 2], 6, &d));
        assert!(!passes_threshold(&[0, 1, 2], 7, &d));
        assert!(passes_threshold(&[0, 1, 2], 0, &d));
    }

    #[test]
    fn row_max_covers_every_row() {
        let m = SubstitutionMatrix::blosum62();
        let rm = m.row_max();
        assert_eq!(rm.len(), 21);
        assert_eq!(rm[0], 4);
        assert_eq!(rm[20], -1);
    }
}
