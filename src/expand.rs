//! Similar-k-mer expansion: every k-mer whose substitution score against an
//! observed window reaches a threshold, found by branch-and-bound over the
//! window positions with per-position row maxima as the bound.

use crate::index::IndexError;
use crate::indexer::Indexer;
use crate::matrix::SubstitutionMatrix;

/// A candidate k-mer index and its score against the window it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoredKmer {
    pub index: u32,
    pub score: i32,
}

/// Produces the scored neighbourhood of a window.
///
/// Implementations append to `out` without clearing it. The exact window must
/// be among the appended candidates. Order and uniqueness are not required.
pub trait KmerExpander: Sync {
    fn kmer_size(&self) -> usize;

    fn expand(&self, window: &[u8], out: &mut Vec<ScoredKmer>);
}

/// Threshold-based neighbourhood generator over a substitution matrix.
#[derive(Clone, Debug)]
pub struct SimilarKmerGenerator {
    matrix: SubstitutionMatrix,
    indexer: Indexer,
    row_max: Vec<i32>,
    threshold: i32,
    max_candidates: Option<usize>,
}

impl SimilarKmerGenerator {
    pub fn new(
        matrix: SubstitutionMatrix,
        kmer_size: usize,
        threshold: i32,
    ) -> Result<Self, IndexError> {
        let indexer = Indexer::new(matrix.alphabet_size(), kmer_size)?;
        let row_max = matrix.row_max();
        Ok(SimilarKmerGenerator {
            matrix,
            indexer,
            row_max,
            threshold,
            max_candidates: None,
        })
    }

    /// Keep at most `n` candidates per window, best scores first. The exact
    /// window always survives the cut.
    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = Some(n.max(1));
        self
    }

    #[inline]
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    fn descend(
        &self,
        window: &[u8],
        suffix_max: &[i32],
        pos: usize,
        score: i32,
        index: u64,
        out: &mut Vec<ScoredKmer>,
    ) {
        if pos == window.len() {
            out.push(ScoredKmer {
                index: index as u32,
                score,
            });
            return;
        }
        let q = window[pos];
        let weight = self.indexer.power(pos);
        for c in 0..self.matrix.alphabet_size() as u8 {
            let s = score + self.matrix.score(q, c);
            if s + suffix_max[pos + 1] < self.threshold {
                continue;
            }
            self.descend(
                window,
                suffix_max,
                pos + 1,
                s,
                index + c as u64 * weight,
                out,
            );
        }
    }
}

impl KmerExpander for SimilarKmerGenerator {
    fn kmer_size(&self) -> usize {
        self.indexer.kmer_size()
    }

    fn expand(&self, window: &[u8], out: &mut Vec<ScoredKmer>) {
        debug_assert_eq!(window.len(), self.indexer.kmer_size());
        let k = window.len();
        // suffix_max[i]: best score obtainable from positions i..k
        let mut suffix_max = vec![0i32; k + 1];
        for i in (0..k).rev() {
            suffix_max[i] = suffix_max[i + 1] + self.row_max[window[i] as usize];
        }

        let start = out.len();
        let exact = ScoredKmer {
            index: self.indexer.int2index(window),
            score: window
                .iter()
                .map(|&c| self.matrix.score(c, c))
                .sum(),
        };
        if exact.score < self.threshold {
            out.push(exact);
        }
        self.descend(window, &suffix_max, 0, 0, 0, out);

        if let Some(cap) = self.max_candidates {
            let produced = &mut out[start..];
            if produced.len() > cap {
                // exact window first, then by descending score
                produced.sort_unstable_by(|a, b| {
                    (b.index == exact.index)
                        .cmp(&(a.index == exact.index))
                        .then(b.score.cmp(&a.score))
                });
                out.truncate(start + cap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(m: &SubstitutionMatrix, window: &[u8], threshold: i32) -> Vec<u32> {
        let ix = Indexer::new(m.alphabet_size(), window.len()).unwrap();
        let mut buf = vec![0u8; window.len()];
        let mut hits = Vec::new();
        for idx in 0..ix.table_size() as u32 {
            ix.index2int(idx, &mut buf);
            let s: i32 = window.iter().zip(&buf).map(|(&a, &b)| m.score(a, b)).sum();
            if s >= threshold {
                hits.push(idx);
            }
        }
        hits
    }

    #[test]
    fn matches_exhaustive_enumeration() {
        let m = SubstitutionMatrix::blosum62();
        let g = SimilarKmerGenerator::new(m.clone(), 3, 11).unwrap();
        let window = [9u8, 10, 19]; // I L V
        let mut out = Vec::new();
        g.expand(&window, &mut out);
        let mut got: Vec<u32> = out.iter().map(|c| c.index).collect();
        got.sort_unstable();
        assert_eq!(got, brute_force(&m, &window, 11));
    }

    #[test]
    fn exact_window_always_present() {
        let m = SubstitutionMatrix::blosum62();
        // threshold far above the self score of A A A (12)
        let g = SimilarKmerGenerator::new(m, 3, 40).unwrap();
        let mut out = Vec::new();
        g.expand(&[0, 0, 0], &mut out);
        assert_eq!(out, vec![ScoredKmer { index: 0, score: 12 }]);
    }

    #[test]
    fn cap_keeps_exact_and_best() {
        let m = SubstitutionMatrix::nucleotide(1, 0);
        let g = SimilarKmerGenerator::new(m, 2, 0)
            .unwrap()
            .with_max_candidates(3);
        let mut out = vec![ScoredKmer { index: 99, score: 0 }];
        g.expand(&[1, 2], &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].index, 99);
        assert_eq!(out[1], ScoredKmer { index: 6, score: 2 });
        assert!(out[2..].iter().all(|c| c.score == 1));
    }
}
