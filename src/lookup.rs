//! Sequence lookup: sequence id → encoded residues, stored contiguously.
//!
//! Built alongside a fresh index and kept behind an `Arc` so the index and
//! downstream consumers can share it; a reused index gets it from the loader.

use crate::index::IndexError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceLookup {
    residues: Vec<u8>,
    // offsets[i]..offsets[i+1] is sequence i
    offsets: Vec<u64>,
}

impl Default for SequenceLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceLookup {
    pub fn new() -> Self {
        SequenceLookup {
            residues: Vec::new(),
            offsets: vec![0],
        }
    }

    pub fn with_capacity(sequences: usize, residues: usize) -> Self {
        let mut offsets = Vec::with_capacity(sequences + 1);
        offsets.push(0);
        SequenceLookup {
            residues: Vec::with_capacity(residues),
            offsets,
        }
    }

    /// Rebuild from persisted parts, checking the offsets describe `residues`.
    pub fn from_parts(residues: Vec<u8>, offsets: Vec<u64>) -> Result<Self, IndexError> {
        let well_formed = offsets.first() == Some(&0)
            && offsets.last() == Some(&(residues.len() as u64))
            && offsets.windows(2).all(|w| w[0] <= w[1]);
        if !well_formed {
            return Err(IndexError::Inconsistent(
                "sequence lookup offsets do not match residue data".into(),
            ));
        }
        Ok(SequenceLookup { residues, offsets })
    }

    /// Append a sequence; it gets the next id.
    pub fn add_sequence(&mut self, codes: &[u8]) -> u32 {
        let id = self.sequence_count() as u32;
        self.residues.extend_from_slice(codes);
        self.offsets.push(self.residues.len() as u64);
        id
    }

    #[inline]
    pub fn sequence(&self, id: u32) -> &[u8] {
        let i = id as usize;
        &self.residues[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    #[inline]
    pub fn sequence_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn residues(&self) -> &[u8] {
        &self.residues
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_fetch() {
        let mut l = SequenceLookup::new();
        assert_eq!(l.add_sequence(&[0, 1, 2]), 0);
        assert_eq!(l.add_sequence(&[]), 1);
        assert_eq!(l.add_sequence(&[3]), 2);
        assert_eq!(l.sequence_count(), 3);
        assert_eq!(l.sequence(0), &[0, 1, 2]);
        assert!(l.sequence(1).is_empty());
        assert_eq!(l.sequence(2), &[3]);
        assert_eq!(l.residue_count(), 4);
    }

    #[test]
    fn from_parts_validates() {
        assert!(SequenceLookup::from_parts(vec![1, 2], vec![0, 1, 2]).is_ok());
        assert!(SequenceLookup::from_parts(vec![1, 2], vec![0, 3]).is_err());
        assert!(SequenceLookup::from_parts(vec![1, 2], vec![0, 2, 1, 2]).is_err());
    }
}
