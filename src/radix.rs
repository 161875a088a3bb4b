//! LSD radix sort for build-time scratch triples, keyed by (k-mer, position).
//! 8-bit passes, only as many as the largest key needs. Stable via counting +
//! prefix sums.

use crate::index::ScratchEntry;

/// Below this length a comparison sort is cheaper than 256-bin passes.
const SMALL_SORT: usize = 256;

/// Sort `entries` ascending by [`ScratchEntry::sort_key`].
/// `tmp` is scratch space; it is resized as needed and can be reused across calls.
pub fn radix_sort_scratch(entries: &mut [ScratchEntry], tmp: &mut Vec<ScratchEntry>) {
    let n = entries.len();
    if n <= 1 {
        return;
    }
    if n < SMALL_SORT {
        entries.sort_by_key(ScratchEntry::sort_key);
        return;
    }

    let max_key = entries.iter().map(ScratchEntry::sort_key).max().unwrap_or(0);
    let key_bytes = (u64::BITS - max_key.leading_zeros()).div_ceil(8);

    tmp.clear();
    tmp.resize(n, ScratchEntry::default());

    // Each pass moves entries -> tmp, then copies back.
    for pass in 0..key_bytes {
        let shift = pass * 8;
        let mut counts = [0usize; 256];

        for e in entries.iter() {
            counts[((e.sort_key() >> shift) & 0xFF) as usize] += 1;
        }

        // A pass where every key shares the byte is a no-op.
        if counts.iter().any(|&c| c == n) {
            continue;
        }

        let mut sum = 0usize;
        for c in counts.iter_mut() {
            let tmp_c = *c;
            *c = sum;
            sum += tmp_c;
        }

        for e in entries.iter() {
            let b = ((e.sort_key() >> shift) & 0xFF) as usize;
            tmp[counts[b]] = *e;
            counts[b] += 1;
        }

        entries.copy_from_slice(&tmp[..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(kmer: u32, position: u16) -> ScratchEntry {
        ScratchEntry {
            kmer,
            seq_id: 5,
            position,
        }
    }

    #[test]
    fn sorts_by_kmer_then_position() {
        let mut v: Vec<ScratchEntry> = (0..2000u32)
            .map(|i| scratch((i * 7919) % 613, (i % 97) as u16))
            .collect();
        let mut expected = v.clone();
        expected.sort_by_key(|e| (e.kmer, e.position));

        let mut tmp = Vec::new();
        radix_sort_scratch(&mut v, &mut tmp);
        assert_eq!(v, expected);
    }

    #[test]
    fn small_inputs_use_comparison_sort() {
        let mut v = vec![scratch(3, 1), scratch(1, 9), scratch(1, 2)];
        radix_sort_scratch(&mut v, &mut Vec::new());
        assert_eq!(v, vec![scratch(1, 2), scratch(1, 9), scratch(3, 1)]);
    }
}
