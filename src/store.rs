//! Sequence store seam: random access to encoded sequences by id.
//!
//! The index only needs `len` and by-id access; `MemoryStore` is the
//! in-process implementation, loaded from FASTA/FASTQ (optionally gzipped).

use needletail::parse_fastx_file;
use std::path::Path;

use crate::encode::Alphabet;
use crate::index::IndexError;
use crate::lookup::SequenceLookup;

/// Encoded sequences addressed by dense ids `0..len()`.
pub trait SequenceStore: Sync {
    fn len(&self) -> usize;

    /// Number of distinct residue codes; every code is below it.
    fn alphabet_size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded residues of sequence `id`.
    fn sequence(&self, id: u32) -> &[u8];

    /// Record name of sequence `id`.
    fn key(&self, id: u32) -> &str;

    /// Total residues across all sequences.
    fn residue_count(&self) -> u64 {
        (0..self.len())
            .map(|id| self.sequence(id as u32).len() as u64)
            .sum()
    }
}

/// In-memory store: names plus residues packed in a [`SequenceLookup`].
#[derive(Clone, Debug)]
pub struct MemoryStore {
    alphabet: Alphabet,
    names: Vec<String>,
    residues: SequenceLookup,
}

impl MemoryStore {
    pub fn new(alphabet: Alphabet) -> Self {
        MemoryStore {
            alphabet,
            names: Vec::new(),
            residues: SequenceLookup::new(),
        }
    }

    /// Encode and append one sequence; returns its id.
    pub fn push(&mut self, name: impl Into<String>, residues: &[u8]) -> Result<u32, IndexError> {
        let codes = self.alphabet.encode(residues)?;
        self.names.push(name.into());
        Ok(self.residues.add_sequence(&codes))
    }

    /// Read every record of a FASTA/FASTQ file.
    pub fn from_fastx(path: &Path, alphabet: Alphabet) -> Result<Self, IndexError> {
        let mut store = MemoryStore::new(alphabet);
        let mut reader = parse_fastx_file(path)
            .map_err(|e| IndexError::Format(format!("{}: {e}", path.display())))?;
        while let Some(record) = reader.next() {
            let rec =
                record.map_err(|e| IndexError::Format(format!("{}: {e}", path.display())))?;
            let name = String::from_utf8_lossy(rec.id()).into_owned();
            store.push(name.clone(), &rec.seq()).map_err(|e| {
                IndexError::Format(format!("{}: record {name}: {e}", path.display()))
            })?;
        }
        log::info!(
            "read {} sequences ({} residues) from {}",
            store.len(),
            store.residue_count(),
            path.display()
        );
        Ok(store)
    }

    #[inline]
    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }
}

impl SequenceStore for MemoryStore {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet.size()
    }

    fn sequence(&self, id: u32) -> &[u8] {
        self.residues.sequence(id)
    }

    fn key(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    fn residue_count(&self) -> u64 {
        self.residues.residue_count() as u64
    }
}
