//! Residue encoding: ASCII → dense integer codes and back.
//!
//! Conventions
//! - Codes are dense in `0..alphabet.size()`; k-mer indices are built from them.
//! - Lookups are case-insensitive.
//! - The nucleotide alphabet has no unknown code: ambiguous bases are rejected.
//! - The amino-acid alphabet folds rare/ambiguous letters onto a standard
//!   residue or onto `X`.

use crate::index::IndexError;

const NO_CODE: u8 = 0xFF;

/// 256-entry LUT: ASCII → nucleotide code (A=0, C=1, G=2, T/U=3), 0xFF otherwise.
pub static NUCLEOTIDE_LUT: [u8; 256] = {
    let mut t = [NO_CODE; 256];
    t[b'A' as usize] = 0;
    t[b'a' as usize] = 0;
    t[b'C' as usize] = 1;
    t[b'c' as usize] = 1;
    t[b'G' as usize] = 2;
    t[b'g' as usize] = 2;
    t[b'T' as usize] = 3;
    t[b't' as usize] = 3;
    t[b'U' as usize] = 3;
    t[b'u' as usize] = 3;
    t
};

/// Amino-acid letters in code order. `X` is the unknown residue.
pub const AMINO_ACIDS: &[u8; 21] = b"ARNDCQEGHILKMFPSTWYVX";

/// Nucleotide letters in code order.
pub const NUCLEOTIDES: &[u8; 4] = b"ACGT";

/// 256-entry LUT: ASCII → amino-acid code, `X` for every other letter.
pub static AMINO_ACID_LUT: [u8; 256] = {
    let x = 20u8;
    let mut t = [NO_CODE; 256];
    let mut c = b'A';
    while c <= b'Z' {
        t[c as usize] = x;
        t[(c + 32) as usize] = x;
        c += 1;
    }
    let mut i = 0;
    while i < AMINO_ACIDS.len() {
        let upper = AMINO_ACIDS[i];
        t[upper as usize] = i as u8;
        t[(upper + 32) as usize] = i as u8;
        i += 1;
    }
    // B→D, Z→E, J→L, U→C, O→K
    let folds: [(u8, u8); 5] = [(b'B', 3), (b'Z', 6), (b'J', 10), (b'U', 4), (b'O', 11)];
    let mut f = 0;
    while f < folds.len() {
        let (letter, code) = folds[f];
        t[letter as usize] = code;
        t[(letter + 32) as usize] = code;
        f += 1;
    }
    t[b'*' as usize] = x;
    t
};

/// Residue alphabet with forward (ASCII → code) and reverse (code → ASCII) maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Alphabet {
    lut: &'static [u8; 256],
    letters: &'static [u8],
}

impl Alphabet {
    /// A, C, G, T (U read as T).
    pub fn nucleotide() -> Self {
        Alphabet {
            lut: &NUCLEOTIDE_LUT,
            letters: NUCLEOTIDES,
        }
    }

    /// 20 standard amino acids plus `X`.
    pub fn amino_acid() -> Self {
        Alphabet {
            lut: &AMINO_ACID_LUT,
            letters: AMINO_ACIDS,
        }
    }

    /// Number of distinct codes.
    #[inline]
    pub fn size(&self) -> usize {
        self.letters.len()
    }

    /// Code for one ASCII residue, `None` if the alphabet has no code for it.
    #[inline]
    pub fn map_residue(&self, b: u8) -> Option<u8> {
        let v = self.lut[b as usize];
        if v == NO_CODE { None } else { Some(v) }
    }

    /// Encode a residue string. Fails on the first residue without a code.
    pub fn encode(&self, residues: &[u8]) -> Result<Vec<u8>, IndexError> {
        residues
            .iter()
            .enumerate()
            .map(|(position, &b)| {
                self.map_residue(b).ok_or(IndexError::InvalidResidue {
                    residue: b as char,
                    position,
                })
            })
            .collect()
    }

    /// ASCII letter for a code.
    #[inline]
    pub fn code_to_char(&self, code: u8) -> u8 {
        self.letters[code as usize]
    }

    /// Decode codes back into ASCII residues.
    pub fn decode(&self, codes: &[u8]) -> Vec<u8> {
        codes.iter().map(|&c| self.code_to_char(c)).collect()
    }
}
