//! IndexTable: k-mer → occurrence-list inverted index with a packed 6-byte
//! record, built in two phases (count, then fill) or borrowed from persisted
//! storage.
//!
//! Build protocol
//! 1. [`KmerCounter`]: per-k-mer counts, incremented atomically, once per
//!    distinct k-mer per sequence.
//! 2. [`KmerCounter::finalize_offsets`]: in-place prefix sum; the counts become
//!    bucket starts which double as write cursors ([`FillCursor`]).
//! 3. [`FillCursor`] / [`FillPartition`]: occurrence records are written at the
//!    cursor of their bucket, advancing it.
//! 4. [`FillCursor::restore_offsets`]: reverse shift turns the cursors (now
//!    bucket ends) back into bucket starts and yields the queryable table.

use bytemuck::{Pod, Zeroable};
use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::fmt;
use std::io::Write;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::encode::Alphabet;
use crate::expand::{KmerExpander, ScoredKmer};
use crate::indexer::Indexer;
use crate::lookup::SequenceLookup;
use crate::matrix::passes_threshold;
use crate::radix::radix_sort_scratch;
use crate::sequence::Sequence;

/// Marks a zero-length bucket while offsets act as write cursors.
const EMPTY_BUCKET: u64 = 1 << 63;

/// Content of an entry slot no record has been written to yet. Its seq id
/// (`u32::MAX`) is never assigned, the builder caps ids below it.
const UNWRITTEN: IndexEntry = IndexEntry([0xFF; 6]);

#[derive(Debug, Error)]
/// Errors returned while building, loading or querying an index.
pub enum IndexError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid index file.
    #[error("Invalid index file: {0}")]
    Format(String),
    /// Bytemuck cast failed.
    #[error("Cast error: {0}")]
    Cast(String),
    /// K-mer length without a supported configuration.
    #[error("Invalid kmer size of {0}")]
    InvalidKmerSize(usize),
    /// Alphabet size outside `2..=256`.
    #[error("Invalid alphabet size of {0}")]
    InvalidAlphabet(usize),
    /// `alphabet_size^kmer_size` does not fit the k-mer index type.
    #[error("k-mer space {alphabet_size}^{kmer_size} exceeds the u32 index range")]
    TableTooLarge {
        alphabet_size: usize,
        kmer_size: usize,
    },
    /// A window starts beyond the range of the record's position field.
    #[error("sequence {seq_id}: window position {position} exceeds {max}", max = u16::MAX)]
    PositionOverflow { seq_id: u32, position: usize },
    /// Residue without a code in the alphabet.
    #[error("invalid residue {residue:?} at position {position}")]
    InvalidResidue { residue: char, position: usize },
    /// Allocation of an index array failed.
    #[error("could not allocate {count} elements for {what}")]
    Allocation { what: &'static str, count: usize },
    /// Arrays or counts that contradict each other.
    #[error("inconsistent index: {0}")]
    Inconsistent(String),
    /// Worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}

/// Occurrence record: `(seq_id, position)` packed into exactly 6 bytes,
/// little-endian, no padding. This is also the persisted layout.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Pod, Zeroable, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry([u8; 6]);

const _: () = assert!(std::mem::size_of::<IndexEntry>() == 6);
const _: () = assert!(std::mem::align_of::<IndexEntry>() == 1);

impl IndexEntry {
    pub const SIZE: usize = 6;

    #[inline]
    pub fn new(seq_id: u32, position: u16) -> Self {
        let id = seq_id.to_le_bytes();
        let pos = position.to_le_bytes();
        IndexEntry([id[0], id[1], id[2], id[3], pos[0], pos[1]])
    }

    #[inline]
    pub fn seq_id(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    #[inline]
    pub fn position(&self) -> u16 {
        u16::from_le_bytes([self.0[4], self.0[5]])
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 6] {
        self.0
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        IndexEntry(bytes)
    }
}

impl fmt::Debug for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.seq_id(), self.position())
    }
}

/// Build-time triple; lives only inside one fill call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ScratchEntry {
    pub kmer: u32,
    pub seq_id: u32,
    pub position: u16,
}

impl ScratchEntry {
    /// Orders by k-mer, then position.
    #[inline]
    pub fn sort_key(&self) -> u64 {
        ((self.kmer as u64) << 16) | self.position as u64
    }
}

/// Per-worker buffers reused across sequences.
#[derive(Default)]
pub struct ScratchBuffers {
    kmers: Vec<u32>,
    candidates: Vec<ScoredKmer>,
    scratch: Vec<ScratchEntry>,
    sort_tmp: Vec<ScratchEntry>,
}

impl ScratchBuffers {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_positions(seq: &Sequence<'_>) -> Result<(), IndexError> {
    match seq.last_window_start() {
        Some(position) if position > u16::MAX as usize => Err(IndexError::PositionOverflow {
            seq_id: seq.id(),
            position,
        }),
        _ => Ok(()),
    }
}

/// Calls `f(kmer, position)` for every window passing the diagonal filter.
fn for_each_exact(
    seq: &mut Sequence<'_>,
    indexer: &Indexer,
    threshold: i32,
    diagonal: &[i8],
    mut f: impl FnMut(u32, usize),
) {
    seq.reset_position();
    while seq.has_next_kmer() {
        let window = seq.next_kmer();
        if !passes_threshold(window, threshold, diagonal) {
            continue;
        }
        f(indexer.int2index(window), seq.current_position());
    }
}

/// Calls `f(kmer, position)` for every expanded candidate of every window.
fn for_each_similar<E: KmerExpander + ?Sized>(
    seq: &mut Sequence<'_>,
    expander: &E,
    candidates: &mut Vec<ScoredKmer>,
    mut f: impl FnMut(u32, usize),
) {
    debug_assert_eq!(expander.kmer_size(), seq.kmer_size());
    seq.reset_position();
    while seq.has_next_kmer() {
        let window = seq.next_kmer();
        candidates.clear();
        expander.expand(window, candidates);
        let position = seq.current_position();
        for c in candidates.iter() {
            f(c.index, position);
        }
    }
}

// ---------------- Phase 1: counting ----------------

/// Counting phase: one atomic counter per k-mer slot (plus the trailing
/// total slot). Shared by reference across worker threads.
pub struct KmerCounter {
    indexer: Indexer,
    counts: Vec<AtomicU64>,
}

impl KmerCounter {
    pub fn new(alphabet_size: usize, kmer_size: usize) -> Result<Self, IndexError> {
        let indexer = Indexer::new(alphabet_size, kmer_size)?;
        let len = indexer.table_size() + 1;
        let mut counts = Vec::new();
        counts
            .try_reserve_exact(len)
            .map_err(|_| IndexError::Allocation {
                what: "offsets",
                count: len,
            })?;
        counts.resize_with(len, || AtomicU64::new(0));
        Ok(KmerCounter { indexer, counts })
    }

    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn table_size(&self) -> usize {
        self.indexer.table_size()
    }

    /// Count the distinct k-mers of `seq`, skipping windows whose diagonal
    /// score is below a positive `threshold`. Returns the distinct count.
    pub fn add_kmer_count(
        &self,
        seq: &mut Sequence<'_>,
        buffers: &mut ScratchBuffers,
        threshold: i32,
        diagonal: &[i8],
    ) -> Result<usize, IndexError> {
        check_positions(seq)?;
        let kmers = &mut buffers.kmers;
        kmers.clear();
        for_each_exact(seq, &self.indexer, threshold, diagonal, |kmer, _| {
            kmers.push(kmer);
        });
        Ok(self.count_distinct(kmers))
    }

    /// Count the distinct k-mers over all expanded candidates of all windows of `seq`.
    pub fn add_similar_kmer_count<E: KmerExpander + ?Sized>(
        &self,
        seq: &mut Sequence<'_>,
        expander: &E,
        buffers: &mut ScratchBuffers,
    ) -> Result<usize, IndexError> {
        check_positions(seq)?;
        let ScratchBuffers {
            kmers, candidates, ..
        } = buffers;
        kmers.clear();
        for_each_similar(seq, expander, candidates, |kmer, _| kmers.push(kmer));
        Ok(self.count_distinct(kmers))
    }

    fn count_distinct(&self, kmers: &mut [u32]) -> usize {
        kmers.sort_unstable();
        let mut distinct = 0usize;
        let mut prev = None;
        for &kmer in kmers.iter() {
            if prev != Some(kmer) {
                self.counts[kmer as usize].fetch_add(1, Ordering::Relaxed);
                distinct += 1;
            }
            prev = Some(kmer);
        }
        distinct
    }

    #[inline]
    pub fn count(&self, kmer: u32) -> u64 {
        self.counts[kmer as usize].load(Ordering::Relaxed)
    }

    /// Sum of all counts so far.
    pub fn total(&self) -> u64 {
        self.counts[..self.table_size()]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Drop a k-mer from the index; the fill pass will skip it.
    pub fn mask(&self, kmer: u32) {
        self.counts[kmer as usize].store(0, Ordering::Relaxed);
    }

    pub fn mask_range(&self, kmers: Range<u32>) {
        let end = (kmers.end as usize).min(self.table_size());
        for c in &self.counts[(kmers.start as usize).min(end)..end] {
            c.store(0, Ordering::Relaxed);
        }
    }

    /// Mask every k-mer occurring in more than `limit` sequences. Returns how
    /// many were masked.
    pub fn mask_above(&self, limit: u64) -> usize {
        let mut masked = 0usize;
        for c in &self.counts[..self.table_size()] {
            if c.load(Ordering::Relaxed) > limit {
                c.store(0, Ordering::Relaxed);
                masked += 1;
            }
        }
        masked
    }

    /// Serial prefix sum over the counts, then allocation of the entries
    /// array sized to the total. Consumes the counter; the offsets are now
    /// write cursors and stay so until [`FillCursor::restore_offsets`].
    pub fn finalize_offsets(
        self,
        sequence_count: usize,
        lookup: Option<Arc<SequenceLookup>>,
    ) -> Result<FillCursor, IndexError> {
        let table_size = self.indexer.table_size();
        // same layout, collected in place
        let mut cursors: Vec<u64> = self
            .counts
            .into_iter()
            .map(AtomicU64::into_inner)
            .collect();

        let mut offset = 0u64;
        for slot in cursors[..table_size].iter_mut() {
            let count = *slot;
            *slot = if count == 0 { offset | EMPTY_BUCKET } else { offset };
            offset += count;
        }
        cursors[table_size] = offset;

        let entry_count = offset as usize;
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(entry_count)
            .map_err(|_| IndexError::Allocation {
                what: "entries",
                count: entry_count,
            })?;
        entries.resize(entry_count, UNWRITTEN);

        log::debug!(
            "finalized offsets: {} k-mer slots, {} entries ({} bytes)",
            table_size,
            entry_count,
            entry_count * IndexEntry::SIZE
        );

        Ok(FillCursor {
            indexer: self.indexer,
            cursors,
            entries,
            entry_count: offset,
            written: AtomicU64::new(0),
            sequence_count,
            lookup,
        })
    }
}

// ---------------- Phase 2: filling ----------------

/// Fill phase: offsets hold one write cursor per bucket.
///
/// Only [`restore_offsets`](Self::restore_offsets) leads out of this state,
/// so a half-built table can never be queried.
pub struct FillCursor {
    indexer: Indexer,
    cursors: Vec<u64>,
    entries: Vec<IndexEntry>,
    entry_count: u64,
    written: AtomicU64,
    sequence_count: usize,
    lookup: Option<Arc<SequenceLookup>>,
}

impl FillCursor {
    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Records written so far by all partitions that have been dropped.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    fn bound(&self, kmer: usize) -> u64 {
        self.cursors[kmer] & !EMPTY_BUCKET
    }

    /// Writable view over the k-mers in `kmers` and the entries they own.
    pub fn partition(&mut self, kmers: Range<usize>) -> FillPartition<'_> {
        let end = kmers.end.min(self.indexer.table_size());
        let start = kmers.start.min(end);
        let (e_start, e_end) = (self.bound(start) as usize, self.bound(end) as usize);
        FillPartition {
            first_kmer: start,
            cursors: &mut self.cursors[start..end],
            base: e_start as u64,
            entries: &mut self.entries[e_start..e_end],
            written: 0,
            total_written: &self.written,
            indexer: &self.indexer,
        }
    }

    /// Split the k-mer space into at most `n` contiguous partitions holding
    /// roughly equal numbers of entries. Partitions never share a bucket or
    /// an entry, so they can be filled from different threads.
    pub fn partitions(&mut self, n: usize) -> Vec<FillPartition<'_>> {
        let table_size = self.indexer.table_size();
        let total = self.entry_count;
        let n = n.max(1) as u64;

        let mut bounds = vec![0usize];
        let mut prev = 0usize;
        for i in 1..n {
            let target = total * i / n;
            let k = self.cursors[..table_size].partition_point(|&c| (c & !EMPTY_BUCKET) < target);
            if k > prev {
                bounds.push(k);
                prev = k;
            }
        }
        if prev < table_size || bounds.len() == 1 {
            bounds.push(table_size);
        }
        let entry_bounds: Vec<u64> = bounds.iter().map(|&k| self.bound(k)).collect();

        let mut parts = Vec::with_capacity(bounds.len() - 1);
        let mut cursors = &mut self.cursors[..table_size];
        let mut entries = &mut self.entries[entry_bounds[0] as usize..];
        for w in 0..bounds.len() - 1 {
            let (c_head, c_tail) = std::mem::take(&mut cursors).split_at_mut(bounds[w + 1] - bounds[w]);
            cursors = c_tail;
            let (e_head, e_tail) = std::mem::take(&mut entries)
                .split_at_mut((entry_bounds[w + 1] - entry_bounds[w]) as usize);
            entries = e_tail;
            parts.push(FillPartition {
                first_kmer: bounds[w],
                cursors: c_head,
                base: entry_bounds[w],
                entries: e_head,
                written: 0,
                total_written: &self.written,
                indexer: &self.indexer,
            });
        }
        parts
    }

    /// Fill the records of `seq` whose k-mer lies in `kmers`.
    pub fn add_sequence(
        &mut self,
        seq: &mut Sequence<'_>,
        buffers: &mut ScratchBuffers,
        kmers: Range<usize>,
        threshold: i32,
        diagonal: &[i8],
    ) -> Result<usize, IndexError> {
        self.partition(kmers)
            .add_sequence(seq, buffers, threshold, diagonal)
    }

    /// Expanded counterpart of [`add_sequence`](Self::add_sequence).
    pub fn add_similar_sequence<E: KmerExpander + ?Sized>(
        &mut self,
        seq: &mut Sequence<'_>,
        expander: &E,
        buffers: &mut ScratchBuffers,
        kmers: Range<usize>,
    ) -> Result<usize, IndexError> {
        self.partition(kmers)
            .add_similar_sequence(seq, expander, buffers)
    }

    /// Reverse shift: every cursor now sits at the end of its bucket, i.e.
    /// the start of the next one. Shift them up by one slot and reset slot 0.
    ///
    /// Fails when the fill pass did not write exactly the counted number of
    /// records (different sequences or filter settings between the passes).
    pub fn restore_offsets(self) -> Result<IndexTable<'static>, IndexError> {
        let FillCursor {
            indexer,
            mut cursors,
            entries,
            entry_count,
            written,
            sequence_count,
            lookup,
        } = self;

        let written = written.into_inner();
        if written != entry_count {
            return Err(IndexError::Inconsistent(format!(
                "fill pass wrote {written} of {entry_count} counted records"
            )));
        }

        let table_size = indexer.table_size();
        for i in (1..=table_size).rev() {
            cursors[i] = cursors[i - 1] & !EMPTY_BUCKET;
        }
        cursors[0] = 0;
        debug_assert_eq!(cursors[table_size], entry_count);

        Ok(IndexTable {
            indexer,
            entry_count,
            sequence_count,
            storage: Storage::Owned {
                offsets: cursors,
                entries,
            },
            lookup,
        })
    }
}

/// Disjoint writable slice of a [`FillCursor`]: a contiguous k-mer range and
/// the entries its buckets own.
pub struct FillPartition<'a> {
    first_kmer: usize,
    cursors: &'a mut [u64],
    // absolute entry offset of entries[0]
    base: u64,
    entries: &'a mut [IndexEntry],
    written: u64,
    total_written: &'a AtomicU64,
    indexer: &'a Indexer,
}

impl FillPartition<'_> {
    /// K-mers owned by this partition.
    #[inline]
    pub fn kmers(&self) -> Range<usize> {
        self.first_kmer..self.first_kmer + self.cursors.len()
    }

    #[inline]
    fn accepts(&self, kmer: u32) -> bool {
        let k = kmer as usize;
        k >= self.first_kmer
            && k < self.first_kmer + self.cursors.len()
            && self.cursors[k - self.first_kmer] & EMPTY_BUCKET == 0
    }

    /// Exact pass: one record per distinct k-mer of `seq` in this partition,
    /// at the lowest position the k-mer occurs. Masked buckets are skipped.
    pub fn add_sequence(
        &mut self,
        seq: &mut Sequence<'_>,
        buffers: &mut ScratchBuffers,
        threshold: i32,
        diagonal: &[i8],
    ) -> Result<usize, IndexError> {
        check_positions(seq)?;
        let ScratchBuffers {
            scratch, sort_tmp, ..
        } = buffers;
        scratch.clear();
        let seq_id = seq.id();
        for_each_exact(seq, self.indexer, threshold, diagonal, |kmer, position| {
            if self.accepts(kmer) {
                scratch.push(ScratchEntry {
                    kmer,
                    seq_id,
                    position: position as u16,
                });
            }
        });
        self.write_distinct(scratch, sort_tmp)
    }

    /// Expanded pass: like [`add_sequence`](Self::add_sequence) over every
    /// candidate of every window.
    pub fn add_similar_sequence<E: KmerExpander + ?Sized>(
        &mut self,
        seq: &mut Sequence<'_>,
        expander: &E,
        buffers: &mut ScratchBuffers,
    ) -> Result<usize, IndexError> {
        check_positions(seq)?;
        let ScratchBuffers {
            candidates,
            scratch,
            sort_tmp,
            ..
        } = buffers;
        scratch.clear();
        let seq_id = seq.id();
        for_each_similar(seq, expander, candidates, |kmer, position| {
            if self.accepts(kmer) {
                scratch.push(ScratchEntry {
                    kmer,
                    seq_id,
                    position: position as u16,
                });
            }
        });
        self.write_distinct(scratch, sort_tmp)
    }

    fn write_distinct(
        &mut self,
        scratch: &mut [ScratchEntry],
        sort_tmp: &mut Vec<ScratchEntry>,
    ) -> Result<usize, IndexError> {
        radix_sort_scratch(scratch, sort_tmp);
        let mut written = 0usize;
        let mut prev = None;
        for e in scratch.iter() {
            if prev == Some(e.kmer) {
                continue;
            }
            prev = Some(e.kmer);
            let local = e.kmer as usize - self.first_kmer;
            let cursor = self.cursors[local];
            // a cursor never sits below its own bucket start
            let bucket_end = match self.cursors.get(local + 1) {
                Some(&next) => next & !EMPTY_BUCKET,
                None => self.base + self.entries.len() as u64,
            };
            let slot = (cursor - self.base) as usize;
            match self.entries.get_mut(slot) {
                Some(entry) if cursor < bucket_end && *entry == UNWRITTEN => {
                    *entry = IndexEntry::new(e.seq_id, e.position);
                }
                _ => {
                    return Err(IndexError::Inconsistent(format!(
                        "k-mer {} overflows its bucket; fill input differs from counting input",
                        e.kmer
                    )));
                }
            }
            self.cursors[local] = cursor + 1;
            written += 1;
        }
        self.written += written as u64;
        Ok(written)
    }
}

impl Drop for FillPartition<'_> {
    fn drop(&mut self) {
        self.total_written.fetch_add(self.written, Ordering::Relaxed);
    }
}

// ---------------- Queryable table ----------------

/// Backing arrays: built here and owned, or borrowed from a loader.
enum Storage<'a> {
    Owned {
        offsets: Vec<u64>,
        entries: Vec<IndexEntry>,
    },
    Borrowed {
        offsets: &'a [u64],
        entries: &'a [IndexEntry],
    },
}

/// Read-only inverted index. Safe to query from any number of threads.
pub struct IndexTable<'a> {
    indexer: Indexer,
    entry_count: u64,
    sequence_count: usize,
    storage: Storage<'a>,
    lookup: Option<Arc<SequenceLookup>>,
}

impl<'a> IndexTable<'a> {
    /// Read view over previously persisted arrays; nothing is copied and
    /// nothing is freed when the table drops.
    ///
    /// Checks array lengths and end points in O(1); call
    /// [`validate`](Self::validate) for the full monotonicity scan.
    pub fn from_external(
        alphabet_size: usize,
        kmer_size: usize,
        sequence_count: usize,
        entry_count: u64,
        offsets: &'a [u64],
        entries: &'a [IndexEntry],
        lookup: Option<Arc<SequenceLookup>>,
    ) -> Result<Self, IndexError> {
        let indexer = Indexer::new(alphabet_size, kmer_size)?;
        let table_size = indexer.table_size();
        if offsets.len() != table_size + 1 {
            return Err(IndexError::Inconsistent(format!(
                "{} offsets for a table of {} k-mers",
                offsets.len(),
                table_size
            )));
        }
        if offsets[0] != 0
            || offsets[table_size] != entry_count
            || entries.len() as u64 != entry_count
        {
            return Err(IndexError::Inconsistent(format!(
                "offsets span {}..{}, {} entries declared, {} present",
                offsets[0],
                offsets[table_size],
                entry_count,
                entries.len()
            )));
        }
        Ok(IndexTable {
            indexer,
            entry_count,
            sequence_count,
            storage: Storage::Borrowed { offsets, entries },
            lookup,
        })
    }

    /// Full scan: offsets are non-decreasing and every record names a
    /// sequence below `sequence_count`.
    pub fn validate(&self) -> Result<(), IndexError> {
        if let Some(i) = self.offsets().windows(2).position(|w| w[0] > w[1]) {
            return Err(IndexError::Inconsistent(format!(
                "offsets decrease at k-mer {i}"
            )));
        }
        if let Some(e) = self
            .entries()
            .iter()
            .find(|e| e.seq_id() as usize >= self.sequence_count)
        {
            return Err(IndexError::Inconsistent(format!(
                "record {e:?} names a sequence beyond {}",
                self.sequence_count
            )));
        }
        Ok(())
    }

    /// Occurrences of `kmer`.
    #[inline]
    pub fn db_seq_list(&self, kmer: u32) -> &[IndexEntry] {
        let offsets = self.offsets();
        let k = kmer as usize;
        &self.entries()[offsets[k] as usize..offsets[k + 1] as usize]
    }

    #[inline]
    pub fn list_size(&self, kmer: u32) -> usize {
        let offsets = self.offsets();
        (offsets[kmer as usize + 1] - offsets[kmer as usize]) as usize
    }

    #[inline]
    pub fn offset(&self, kmer: usize) -> u64 {
        self.offsets()[kmer]
    }

    #[inline]
    pub fn offsets(&self) -> &[u64] {
        match &self.storage {
            Storage::Owned { offsets, .. } => offsets,
            Storage::Borrowed { offsets, .. } => offsets,
        }
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        match &self.storage {
            Storage::Owned { entries, .. } => entries,
            Storage::Borrowed { entries, .. } => entries,
        }
    }

    /// Whether the arrays are borrowed from external storage.
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.storage, Storage::Borrowed { .. })
    }

    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn table_size(&self) -> usize {
        self.indexer.table_size()
    }

    #[inline]
    pub fn kmer_size(&self) -> usize {
        self.indexer.kmer_size()
    }

    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.indexer.alphabet_size()
    }

    #[inline]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Number of sequences indexed.
    #[inline]
    pub fn sequence_count(&self) -> usize {
        self.sequence_count
    }

    #[inline]
    pub fn size_of_entry(&self) -> usize {
        IndexEntry::SIZE
    }

    pub fn sequence_lookup(&self) -> Option<&Arc<SequenceLookup>> {
        self.lookup.as_ref()
    }

    pub fn kmer_string(&self, kmer: u32, alphabet: &Alphabet) -> String {
        self.indexer.kmer_string(kmer, alphabet)
    }

    /// One linear pass over the offsets.
    pub fn statistics(&self, top_n: usize, alphabet: &Alphabet) -> IndexStatistics {
        let table_size = self.table_size();
        let mut heap: BinaryHeap<Reverse<(u64, Reverse<u32>)>> = BinaryHeap::with_capacity(top_n + 1);
        let mut entries = 0u64;
        let mut empty = 0u64;
        let mut min_len = u64::MAX;
        let mut max_len = 0u64;
        for (kmer, w) in self.offsets().windows(2).enumerate() {
            let len = w[1] - w[0];
            entries += len;
            min_len = min_len.min(len);
            max_len = max_len.max(len);
            if len == 0 {
                empty += 1;
                continue;
            }
            if top_n > 0 {
                heap.push(Reverse((len, Reverse(kmer as u32))));
                if heap.len() > top_n {
                    heap.pop();
                }
            }
        }
        let top = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse((len, Reverse(kmer)))| (self.kmer_string(kmer, alphabet), len))
            .collect();

        IndexStatistics {
            table_size,
            entries,
            memory_bytes: entries * IndexEntry::SIZE as u64 + table_size as u64 * 8,
            avg_list_len: entries as f64 / table_size as f64,
            min_list_len: if table_size == 0 { 0 } else { min_len },
            max_list_len: max_len,
            empty_lists: empty,
            top,
        }
    }

    pub fn log_statistics(&self, top_n: usize, alphabet: &Alphabet) {
        for line in self.statistics(top_n, alphabet).to_string().lines() {
            log::info!("{line}");
        }
    }

    /// Write every non-empty list as a k-mer line followed by one
    /// `(seq_id, position)` line per record.
    pub fn write_lists<W: Write>(&self, w: &mut W, alphabet: &Alphabet) -> std::io::Result<()> {
        let offsets = self.offsets();
        let entries = self.entries();
        for kmer in 0..self.table_size() {
            let list = &entries[offsets[kmer] as usize..offsets[kmer + 1] as usize];
            if list.is_empty() {
                continue;
            }
            writeln!(w, "{}", self.kmer_string(kmer as u32, alphabet))?;
            for e in list {
                writeln!(w, "\t({}, {})", e.seq_id(), e.position())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for IndexTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexTable")
            .field("alphabet_size", &self.alphabet_size())
            .field("kmer_size", &self.kmer_size())
            .field("table_size", &self.table_size())
            .field("entry_count", &self.entry_count)
            .field("sequence_count", &self.sequence_count)
            .field("external", &self.is_external())
            .finish()
    }
}

/// Summary produced by [`IndexTable::statistics`].
#[derive(Clone, Debug, PartialEq)]
pub struct IndexStatistics {
    pub table_size: usize,
    pub entries: u64,
    /// Entries plus one 8-byte offset per k-mer slot.
    pub memory_bytes: u64,
    pub avg_list_len: f64,
    pub min_list_len: u64,
    pub max_list_len: u64,
    pub empty_lists: u64,
    /// Largest lists, longest first: (decoded k-mer, length).
    pub top: Vec<(String, u64)>,
}

impl fmt::Display for IndexStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index statistics")?;
        writeln!(f, "Entries:          {}", self.entries)?;
        writeln!(f, "Index size:       {} (byte)", self.memory_bytes)?;
        writeln!(f, "Avg k-mer size:   {:.4}", self.avg_list_len)?;
        writeln!(f, "Top {} k-mers", self.top.len())?;
        for (kmer, len) in &self.top {
            writeln!(f, "\t{kmer}\t\t{len}")?;
        }
        writeln!(f, "Min k-mer size:   {}", self.min_list_len)?;
        writeln!(f, "Max k-mer size:   {}", self.max_list_len)?;
        write!(f, "Empty lists:      {}", self.empty_lists)
    }
}

// ---------------- k-mer size policy ----------------

/// Chooses between k=6 and k=7 from the number of residues to index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KmerSizePolicy {
    /// Largest residue count served with k=6.
    pub k6_upper_bound: u64,
}

impl Default for KmerSizePolicy {
    fn default() -> Self {
        KmerSizePolicy {
            k6_upper_bound: Self::DEFAULT_K6_UPPER_BOUND,
        }
    }
}

impl KmerSizePolicy {
    pub const DEFAULT_K6_UPPER_BOUND: u64 = 3_350_000_000;

    pub fn with_k6_upper_bound(k6_upper_bound: u64) -> Self {
        KmerSizePolicy { k6_upper_bound }
    }

    pub fn compute_kmer_size(&self, residues: u64) -> usize {
        if residues < self.k6_upper_bound { 6 } else { 7 }
    }

    /// Largest residue count a k-mer size is meant for. Only 6 and 7 are
    /// supported; anything else is a configuration error.
    pub fn upper_bound_for(&self, kmer_size: usize) -> Result<u64, IndexError> {
        match kmer_size {
            6 => Ok(self.k6_upper_bound),
            // u64::MAX is kept free as a sentinel
            7 => Ok(u64::MAX - 1),
            other => Err(IndexError::InvalidKmerSize(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(
        alphabet_size: usize,
        kmer_size: usize,
        seqs: &[&[u8]],
        threshold: i32,
        diagonal: &[i8],
    ) -> IndexTable<'static> {
        let counter = KmerCounter::new(alphabet_size, kmer_size).unwrap();
        let mut buffers = ScratchBuffers::new();
        for (id, codes) in seqs.iter().enumerate() {
            let mut s = Sequence::new(id as u32, codes, kmer_size);
            counter
                .add_kmer_count(&mut s, &mut buffers, threshold, diagonal)
                .unwrap();
        }
        let mut fill = counter.finalize_offsets(seqs.len(), None).unwrap();
        let table_size = fill.indexer().table_size();
        for (id, codes) in seqs.iter().enumerate() {
            let mut s = Sequence::new(id as u32, codes, kmer_size);
            fill.add_sequence(&mut s, &mut buffers, 0..table_size, threshold, diagonal)
                .unwrap();
        }
        fill.restore_offsets().unwrap()
    }

    #[test]
    fn entry_layout_is_six_le_bytes() {
        let e = IndexEntry::new(0x0403_0201, 0x0605);
        assert_eq!(e.to_bytes(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(e.seq_id(), 0x0403_0201);
        assert_eq!(e.position(), 0x0605);
        assert_eq!(IndexEntry::from_bytes(e.to_bytes()), e);
        let v = vec![e; 3];
        assert_eq!(bytemuck::cast_slice::<IndexEntry, u8>(&v).len(), 18);
    }

    #[test]
    fn acgt_scenario() {
        let t = build(4, 2, &[&[0, 1, 2, 3]], 0, &[]);
        assert_eq!(t.table_size(), 16);
        assert_eq!(t.entry_count(), 3);
        assert_eq!(t.offsets()[16], 3);
        assert_eq!(t.db_seq_list(1), &[IndexEntry::new(0, 0)]);
        assert_eq!(t.db_seq_list(6), &[IndexEntry::new(0, 1)]);
        assert_eq!(t.db_seq_list(11), &[IndexEntry::new(0, 2)]);
        assert!(t.db_seq_list(0).is_empty());
        assert!(!t.is_external());
        t.validate().unwrap();
    }

    #[test]
    fn repeated_kmer_counts_once_at_first_position() {
        // AC appears at 0 and 2
        let t = build(4, 2, &[&[0, 1, 0, 1]], 0, &[]);
        assert_eq!(t.list_size(1), 1);
        assert_eq!(t.db_seq_list(1), &[IndexEntry::new(0, 0)]);
        assert_eq!(t.db_seq_list(4), &[IndexEntry::new(0, 1)]);
        assert_eq!(t.entry_count(), 2);
    }

    #[test]
    fn threshold_drops_low_scoring_windows() {
        // diagonal: A=1 C=1 G=5 T=5; threshold 6 keeps only windows with G or T
        let diagonal = [1i8, 1, 5, 5];
        let t = build(4, 2, &[&[0, 1, 2, 3]], 6, &diagonal);
        assert_eq!(t.list_size(1), 0); // AC = 2
        assert_eq!(t.list_size(6), 1); // CG = 6
        assert_eq!(t.list_size(11), 1); // GT = 10
        assert_eq!(t.entry_count(), 2);
    }

    #[test]
    fn masked_bucket_is_skipped() {
        let codes: &[u8] = &[0, 1, 2, 3];
        let counter = KmerCounter::new(4, 2).unwrap();
        let mut buffers = ScratchBuffers::new();
        let mut s = Sequence::new(0, codes, 2);
        assert_eq!(counter.add_kmer_count(&mut s, &mut buffers, 0, &[]).unwrap(), 3);
        counter.mask(6);
        assert_eq!(counter.total(), 2);

        let mut fill = counter.finalize_offsets(1, None).unwrap();
        let written = fill
            .add_sequence(&mut s, &mut buffers, 0..16, 0, &[])
            .unwrap();
        assert_eq!(written, 2);
        let t = fill.restore_offsets().unwrap();
        assert_eq!(t.list_size(6), 0);
        assert_eq!(t.db_seq_list(11), &[IndexEntry::new(0, 2)]);
    }

    #[test]
    fn restore_rejects_incomplete_fill() {
        let codes: &[u8] = &[0, 1, 2, 3];
        let counter = KmerCounter::new(4, 2).unwrap();
        let mut buffers = ScratchBuffers::new();
        let mut s = Sequence::new(0, codes, 2);
        counter.add_kmer_count(&mut s, &mut buffers, 0, &[]).unwrap();
        let mut fill = counter.finalize_offsets(1, None).unwrap();
        // only the lower half of the k-mer space
        fill.add_sequence(&mut s, &mut buffers, 0..8, 0, &[]).unwrap();
        assert_eq!(fill.written(), 2);
        assert!(matches!(
            fill.restore_offsets(),
            Err(IndexError::Inconsistent(_))
        ));
    }

    #[test]
    fn mask_range_clears_a_kmer_span() {
        let codes: &[u8] = &[0, 1, 2, 3];
        let counter = KmerCounter::new(4, 2).unwrap();
        let mut buffers = ScratchBuffers::new();
        let mut s = Sequence::new(0, codes, 2);
        counter.add_kmer_count(&mut s, &mut buffers, 0, &[]).unwrap();

        // AC=1, CG=6
        counter.mask_range(0..7);
        assert_eq!(counter.count(1), 0);
        assert_eq!(counter.count(6), 0);
        assert_eq!(counter.count(11), 1);

        // clamped to the table; the trailing slot is untouched
        counter.mask_range(10..100);
        assert_eq!(counter.total(), 0);
        counter.mask_range(9..3);

        let mut fill = counter.finalize_offsets(1, None).unwrap();
        assert_eq!(fill.entry_count(), 0);
        assert_eq!(fill.add_sequence(&mut s, &mut buffers, 0..16, 0, &[]).unwrap(), 0);
        let t = fill.restore_offsets().unwrap();
        assert_eq!(t.entry_count(), 0);
        assert!(t.entries().is_empty());
    }

    /// Counts AC (1) and AG (2) once each, then fills with `order`.
    fn fill_in_order(order: &[usize]) -> Result<(), IndexError> {
        let seqs: [&[u8]; 2] = [&[0, 1], &[0, 2]];
        let counter = KmerCounter::new(4, 2).unwrap();
        let mut buffers = ScratchBuffers::new();
        for (id, codes) in seqs.iter().enumerate() {
            let mut s = Sequence::new(id as u32, codes, 2);
            counter.add_kmer_count(&mut s, &mut buffers, 0, &[]).unwrap();
        }
        let mut fill = counter.finalize_offsets(2, None).unwrap();
        for &id in order {
            let mut s = Sequence::new(id as u32, seqs[id], 2);
            fill.add_sequence(&mut s, &mut buffers, 0..16, 0, &[])?;
        }
        fill.restore_offsets().map(|_| ())
    }

    #[test]
    fn bucket_overflow_is_rejected_within_a_partition() {
        fill_in_order(&[0, 1]).unwrap();
        // same totals, but AC gets two records and AG none
        assert!(matches!(
            fill_in_order(&[0, 0]),
            Err(IndexError::Inconsistent(_))
        ));
        // AG already written when AC spills into its slot
        assert!(matches!(
            fill_in_order(&[1, 0, 0]),
            Err(IndexError::Inconsistent(_))
        ));
    }

    #[test]
    fn partitions_are_disjoint_and_cover_everything() {
        let seqs: Vec<Vec<u8>> = (0..20u8)
            .map(|i| (0..30).map(|j| (i.wrapping_mul(7) + j * 3) % 4).collect())
            .collect();
        let counter = KmerCounter::new(4, 3).unwrap();
        let mut buffers = ScratchBuffers::new();
        for (id, codes) in seqs.iter().enumerate() {
            let mut s = Sequence::new(id as u32, codes, 3);
            counter.add_kmer_count(&mut s, &mut buffers, 0, &[]).unwrap();
        }
        let mut fill = counter.finalize_offsets(seqs.len(), None).unwrap();
        {
            let mut parts = fill.partitions(4);
            assert!(!parts.is_empty() && parts.len() <= 4);
            let mut next = 0;
            for p in &parts {
                assert_eq!(p.kmers().start, next);
                next = p.kmers().end;
            }
            assert_eq!(next, 64);
            for p in parts.iter_mut() {
                for (id, codes) in seqs.iter().enumerate() {
                    let mut s = Sequence::new(id as u32, codes, 3);
                    p.add_sequence(&mut s, &mut buffers, 0, &[]).unwrap();
                }
            }
        }
        let t = fill.restore_offsets().unwrap();
        t.validate().unwrap();
        for kmer in 0..64u32 {
            for e in t.db_seq_list(kmer) {
                let codes = &seqs[e.seq_id() as usize];
                let p = e.position() as usize;
                assert_eq!(t.indexer().int2index(&codes[p..p + 3]), kmer);
            }
        }
    }

    #[test]
    fn position_overflow_is_rejected_before_counting() {
        let codes = vec![0u8; u16::MAX as usize + 3];
        let counter = KmerCounter::new(4, 2).unwrap();
        let mut s = Sequence::new(9, &codes, 2);
        let err = counter
            .add_kmer_count(&mut s, &mut ScratchBuffers::new(), 0, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::PositionOverflow {
                seq_id: 9,
                position: 65536
            }
        ));
        assert_eq!(counter.total(), 0);

        // last window exactly at u16::MAX is fine
        let codes = vec![0u8; u16::MAX as usize + 2];
        let mut s = Sequence::new(0, &codes, 2);
        assert!(counter
            .add_kmer_count(&mut s, &mut ScratchBuffers::new(), 0, &[])
            .is_ok());
    }

    #[test]
    fn external_view_checks_shape() {
        let offsets = [0u64, 1, 1, 2];
        let entries = [IndexEntry::new(0, 0), IndexEntry::new(1, 4)];
        // alphabet 3, k=1 → 3 slots
        let t = IndexTable::from_external(3, 1, 2, 2, &offsets, &entries, None).unwrap();
        assert!(t.is_external());
        assert_eq!(t.db_seq_list(2), &[IndexEntry::new(1, 4)]);
        t.validate().unwrap();

        assert!(IndexTable::from_external(3, 1, 2, 3, &offsets, &entries, None).is_err());
        assert!(IndexTable::from_external(4, 1, 2, 2, &offsets, &entries, None).is_err());
        let bad = [0u64, 2, 1, 2];
        let t = IndexTable::from_external(3, 1, 2, 2, &bad, &entries, None).unwrap();
        assert!(t.validate().is_err());
    }

    #[test]
    fn statistics_report() {
        let t = build(4, 2, &[&[0, 1, 2, 3], &[0, 1, 1, 1]], 0, &[]);
        let alphabet = Alphabet::nucleotide();
        let st = t.statistics(2, &alphabet);
        assert_eq!(st.entries, 5);
        assert_eq!(st.empty_lists, 12);
        assert_eq!(st.max_list_len, 2);
        assert_eq!(st.min_list_len, 0);
        assert_eq!(st.memory_bytes, 5 * 6 + 16 * 8);
        assert_eq!(st.top[0], ("AC".to_string(), 2));
        assert_eq!(st.top.len(), 2);
        assert!(st.to_string().contains("Empty lists:      12"));
    }

    #[test]
    fn write_lists_dumps_non_empty() {
        let t = build(4, 2, &[&[2, 3]], 0, &[]);
        let mut out = Vec::new();
        t.write_lists(&mut out, &Alphabet::nucleotide()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "GT\n\t(0, 0)\n");
    }

    #[test]
    fn kmer_size_policy() {
        let p = KmerSizePolicy::default();
        assert_eq!(p.compute_kmer_size(1_000), 6);
        assert_eq!(p.compute_kmer_size(3_350_000_000), 7);
        assert_eq!(p.upper_bound_for(6).unwrap(), 3_350_000_000);
        assert!(matches!(
            p.upper_bound_for(5),
            Err(IndexError::InvalidKmerSize(5))
        ));
        assert_eq!(KmerSizePolicy::with_k6_upper_bound(10).compute_kmer_size(10), 7);
    }
}
