use clap::{Parser, ValueEnum};
use kmer_index_table::logging::init_logger;
use kmer_index_table::*;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlphabetArg {
    /// 20 amino acids + X, BLOSUM62
    Aa,
    /// A C G T, match/mismatch scores
    Nucl,
}

/// Build a `.kit` k-mer index from FASTA/FASTQ.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input FASTA/FASTQ(.gz) path
    #[arg(short, long)]
    input: PathBuf,

    /// Output `.kit` path
    #[arg(short, long)]
    output: PathBuf,

    /// Residue alphabet
    #[arg(long, value_enum, default_value_t = AlphabetArg::Aa)]
    alphabet: AlphabetArg,

    /// K-mer length (default: 6 or 7 from the residue count)
    #[arg(short = 'k', long)]
    kmer_size: Option<usize>,

    /// Residue count up to which k=6 is chosen
    #[arg(long, default_value_t = KmerSizePolicy::DEFAULT_K6_UPPER_BOUND)]
    k6_upper_bound: u64,

    /// Skip windows whose diagonal score is below this (0 = off)
    #[arg(long, default_value_t = 0)]
    kmer_threshold: i32,

    /// Index similar k-mers scoring at least this against each window
    #[arg(long)]
    similar_kmer_threshold: Option<i32>,

    /// Maximum similar k-mers per window
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Mask k-mers found in more than this many sequences
    #[arg(long)]
    max_kmer_count: Option<u64>,

    /// Nucleotide match score
    #[arg(long, default_value_t = 2)]
    match_score: i8,

    /// Nucleotide mismatch score
    #[arg(long, default_value_t = -3, allow_hyphen_values = true)]
    mismatch: i8,

    /// Worker threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// K-mer space partitions for the fill pass (default: thread count)
    #[arg(long)]
    fill_partitions: Option<usize>,

    /// Store the sequences alongside the index
    #[arg(long, default_value_t = false)]
    lookup: bool,

    /// Log statistics with the N largest lists after building
    #[arg(long)]
    stats: Option<usize>,

    /// Info-level logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let (alphabet, matrix) = match args.alphabet {
        AlphabetArg::Aa => (Alphabet::amino_acid(), SubstitutionMatrix::blosum62()),
        AlphabetArg::Nucl => (
            Alphabet::nucleotide(),
            SubstitutionMatrix::nucleotide(args.match_score, args.mismatch),
        ),
    };
    let policy = KmerSizePolicy::with_k6_upper_bound(args.k6_upper_bound);

    // Protein indexes are only tuned for k=6 and k=7.
    if let (AlphabetArg::Aa, Some(k)) = (args.alphabet, args.kmer_size) {
        if let Err(e) = policy.upper_bound_for(k) {
            log::error!("{e}");
            std::process::exit(1);
        }
    }

    let store = MemoryStore::from_fastx(&args.input, alphabet)?;

    let mut cfg = BuildConfig::default()
        .policy(policy)
        .kmer_threshold(args.kmer_threshold)
        .with_lookup(args.lookup);
    if let Some(k) = args.kmer_size {
        cfg = cfg.kmer_size(k);
    }
    if let Some(t) = args.similar_kmer_threshold {
        cfg = cfg.similar_kmer_threshold(t);
    }
    if let Some(n) = args.max_candidates {
        cfg = cfg.max_candidates(n);
    }
    if let Some(n) = args.max_kmer_count {
        cfg = cfg.max_kmer_count(n);
    }
    if let Some(n) = args.threads {
        cfg = cfg.threads(n);
    }
    if let Some(n) = args.fill_partitions {
        cfg = cfg.fill_partitions(n);
    }

    let table = match build_index(&store, &matrix, &cfg) {
        Ok(t) => t,
        Err(e @ IndexError::Allocation { .. }) => {
            log::error!("{e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(n) = args.stats {
        table.log_statistics(n, &alphabet);
    }

    IndexWriter::new(&table).write_to(&args.output)?;
    eprintln!(
        "Built kit: k={}, alphabet={}, sequences={}, entries={}",
        table.kmer_size(),
        table.alphabet_size(),
        table.sequence_count(),
        table.entry_count()
    );

    Ok(())
}
