//! Parallel two-phase build (rayon): count → finalize → partitioned fill →
//! restore. Phases are separated by the joins at the end of each parallel
//! iterator, so they never overlap.

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::expand::SimilarKmerGenerator;
use crate::index::{IndexError, IndexTable, KmerCounter, KmerSizePolicy, ScratchBuffers};
use crate::lookup::SequenceLookup;
use crate::matrix::SubstitutionMatrix;
use crate::sequence::Sequence;
use crate::store::SequenceStore;

/// Build-time configuration.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    kmer_size: Option<usize>,
    threads: Option<usize>,
    kmer_threshold: i32,
    similar_kmer_threshold: Option<i32>,
    max_candidates: Option<usize>,
    max_kmer_count: Option<u64>,
    fill_partitions: Option<usize>,
    with_lookup: bool,
    policy: KmerSizePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            kmer_size: None,
            threads: None,
            kmer_threshold: 0,
            similar_kmer_threshold: None,
            max_candidates: None,
            max_kmer_count: None,
            fill_partitions: None,
            with_lookup: false,
            policy: KmerSizePolicy::default(),
        }
    }
}

impl BuildConfig {
    /// Fix the k-mer length. Unset: chosen by the [`KmerSizePolicy`].
    pub fn kmer_size(mut self, k: usize) -> Self {
        self.kmer_size = Some(k);
        self
    }
    /// Run on a dedicated pool of `n` threads.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = Some(n.max(1));
        self
    }
    /// Drop windows whose diagonal score is below `t` (0 disables).
    pub fn kmer_threshold(mut self, t: i32) -> Self {
        self.kmer_threshold = t;
        self
    }
    /// Index similar k-mers scoring at least `t` instead of exact windows.
    pub fn similar_kmer_threshold(mut self, t: i32) -> Self {
        self.similar_kmer_threshold = Some(t);
        self
    }
    /// Cap the similar k-mers admitted per window.
    pub fn max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = Some(n);
        self
    }
    /// Mask k-mers found in more than `n` sequences.
    pub fn max_kmer_count(mut self, n: u64) -> Self {
        self.max_kmer_count = Some(n);
        self
    }
    /// Number of k-mer space partitions filled in parallel (default: thread count).
    pub fn fill_partitions(mut self, n: usize) -> Self {
        self.fill_partitions = Some(n.max(1));
        self
    }
    /// Keep a copy of every sequence in the table's lookup.
    pub fn with_lookup(mut self, yes: bool) -> Self {
        self.with_lookup = yes;
        self
    }
    /// K-mer size policy used when no explicit size is set.
    pub fn policy(mut self, p: KmerSizePolicy) -> Self {
        self.policy = p;
        self
    }

    /// The k-mer length a build over `residues` residues will use.
    pub fn effective_kmer_size(&self, residues: u64) -> usize {
        self.kmer_size
            .unwrap_or_else(|| self.policy.compute_kmer_size(residues))
    }
}

/// Build an index over every sequence of `store`, scoring with `matrix`
/// (whose size is the alphabet size).
pub fn build_index<S: SequenceStore + ?Sized>(
    store: &S,
    matrix: &SubstitutionMatrix,
    cfg: &BuildConfig,
) -> Result<IndexTable<'static>, IndexError> {
    match cfg.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| IndexError::ThreadPool(e.to_string()))?;
            pool.install(|| build_in_pool(store, matrix, cfg))
        }
        None => build_in_pool(store, matrix, cfg),
    }
}

fn build_in_pool<S: SequenceStore + ?Sized>(
    store: &S,
    matrix: &SubstitutionMatrix,
    cfg: &BuildConfig,
) -> Result<IndexTable<'static>, IndexError> {
    let n = store.len();
    if n > u32::MAX as usize {
        return Err(IndexError::Inconsistent(format!(
            "{n} sequences exceed the u32 id range"
        )));
    }
    if store.alphabet_size() != matrix.alphabet_size() {
        return Err(IndexError::Inconsistent(format!(
            "sequences use {} residue codes, the substitution matrix scores {}",
            store.alphabet_size(),
            matrix.alphabet_size()
        )));
    }
    let residues = store.residue_count();
    let kmer_size = cfg.effective_kmer_size(residues);
    match (cfg.kmer_size, cfg.policy.upper_bound_for(kmer_size)) {
        (None, _) => log::info!("k-mer size {kmer_size} chosen for {residues} residues"),
        (Some(_), Ok(bound)) if residues > bound => log::warn!(
            "{residues} residues exceed the {bound} recommended for k-mer size {kmer_size}"
        ),
        _ => {}
    }

    let counter = KmerCounter::new(matrix.alphabet_size(), kmer_size)?;
    let diagonal = matrix.diagonal_scores();
    let expander = match cfg.similar_kmer_threshold {
        Some(t) => {
            let g = SimilarKmerGenerator::new(matrix.clone(), kmer_size, t)?;
            Some(match cfg.max_candidates {
                Some(c) => g.with_max_candidates(c),
                None => g,
            })
        }
        None => None,
    };
    let threshold = cfg.kmer_threshold;

    // Phase 1: counting
    let t0 = Instant::now();
    let distinct = (0..n as u32)
        .into_par_iter()
        .map_init(ScratchBuffers::new, |buffers, id| {
            let mut seq = Sequence::new(id, store.sequence(id), kmer_size);
            match &expander {
                Some(e) => counter.add_similar_kmer_count(&mut seq, e, buffers),
                None => counter.add_kmer_count(&mut seq, buffers, threshold, &diagonal),
            }
        })
        .try_reduce(|| 0usize, |a, b| Ok(a + b))?;
    log::info!(
        "counted {distinct} k-mer occurrences in {n} sequences ({:.2?})",
        t0.elapsed()
    );

    if let Some(limit) = cfg.max_kmer_count {
        let masked = counter.mask_above(limit);
        log::info!("masked {masked} k-mers occurring in more than {limit} sequences");
    }

    let lookup = cfg.with_lookup.then(|| {
        let mut l = SequenceLookup::with_capacity(n, residues as usize);
        for id in 0..n as u32 {
            l.add_sequence(store.sequence(id));
        }
        Arc::new(l)
    });

    // Phase 2: prefix sum
    let mut fill = counter.finalize_offsets(n, lookup)?;

    // Phase 3: partitioned fill
    let t1 = Instant::now();
    let parts = cfg
        .fill_partitions
        .unwrap_or_else(rayon::current_num_threads);
    let entry_count = fill.entry_count();
    fill.partitions(parts)
        .into_par_iter()
        .try_for_each_init(ScratchBuffers::new, |buffers, mut part| {
            for id in 0..n as u32 {
                let mut seq = Sequence::new(id, store.sequence(id), kmer_size);
                match &expander {
                    Some(e) => part.add_similar_sequence(&mut seq, e, buffers)?,
                    None => part.add_sequence(&mut seq, buffers, threshold, &diagonal)?,
                };
            }
            Ok::<(), IndexError>(())
        })?;
    log::info!(
        "filled {entry_count} entries over {parts} partitions ({:.2?})",
        t1.elapsed()
    );

    // Phase 4: cursors back to range starts
    let table = fill.restore_offsets()?;
    log::debug!("{table:?}");
    Ok(table)
}
