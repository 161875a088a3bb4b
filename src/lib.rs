//! K-mer inverted index for sequence-search prefiltering.
//!
//! Maps every k-mer slot in `[0, alphabet_size^k)` to the list of
//! `(sequence id, position)` occurrences, so a search only aligns against
//! sequences that share k-mers with the query.
//!
//! - Two-phase build: atomic per-k-mer counting, in-place prefix sum, then a
//!   partitioned parallel fill that reuses the offsets as write cursors
//! - 6-byte little-endian occurrence records, identical in memory and on disk
//! - Optional similar-k-mer expansion over a substitution matrix
//! - Persisted indexes are memory-mapped and queried in place
//!
//! See [`index`] for the build protocol and [`io`] for the file format.

mod builder;
pub mod encode;
pub mod expand;
pub mod index;
pub mod indexer;
pub mod io;
pub mod logging;
pub mod lookup;
pub mod matrix;
mod radix;
pub mod sequence;
pub mod store;

pub use builder::{BuildConfig, build_index};
pub use encode::Alphabet;
pub use expand::{KmerExpander, ScoredKmer, SimilarKmerGenerator};
pub use index::{
    FillCursor, FillPartition, IndexEntry, IndexError, IndexStatistics, IndexTable, KmerCounter,
    KmerSizePolicy, ScratchBuffers,
};
pub use indexer::Indexer;
pub use io::{IndexWriter, MappedIndex};
pub use lookup::SequenceLookup;
pub use matrix::SubstitutionMatrix;
pub use sequence::Sequence;
pub use store::{MemoryStore, SequenceStore};
