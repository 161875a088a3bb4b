use clap::{Parser, ValueEnum};
use kmer_index_table::logging::init_logger;
use kmer_index_table::*;
use std::io::Write;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlphabetArg {
    Aa,
    Nucl,
}

/// Inspect a `.kit` k-mer index.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Index path
    index: PathBuf,

    /// Alphabet the index was built with
    #[arg(long, value_enum, default_value_t = AlphabetArg::Aa)]
    alphabet: AlphabetArg,

    /// Print the occurrence list of this k-mer
    #[arg(long)]
    kmer: Option<String>,

    /// Print statistics with the N largest lists
    #[arg(long)]
    stats: Option<usize>,

    /// Dump every non-empty list
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Scan offsets and records for consistency
    #[arg(long, default_value_t = false)]
    validate: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let alphabet = match args.alphabet {
        AlphabetArg::Aa => Alphabet::amino_acid(),
        AlphabetArg::Nucl => Alphabet::nucleotide(),
    };

    let mapped = MappedIndex::open(&args.index)?;
    let table = mapped.table()?;
    if table.alphabet_size() != alphabet.size() {
        anyhow::bail!(
            "index alphabet has {} letters, --alphabet has {}",
            table.alphabet_size(),
            alphabet.size()
        );
    }
    if args.validate {
        table.validate()?;
        log::info!("index is consistent");
    }

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());

    if let Some(n) = args.stats {
        writeln!(out, "{}", table.statistics(n, &alphabet))?;
    }

    if let Some(kmer) = &args.kmer {
        if kmer.len() != table.kmer_size() {
            anyhow::bail!(
                "k-mer {kmer:?} has length {}, index uses {}",
                kmer.len(),
                table.kmer_size()
            );
        }
        let codes = alphabet.encode(kmer.as_bytes())?;
        let index = table.indexer().int2index(&codes);
        let list = table.db_seq_list(index);
        writeln!(out, "{}\t{}", table.kmer_string(index, &alphabet), list.len())?;
        for e in list {
            writeln!(out, "\t({}, {})", e.seq_id(), e.position())?;
        }
    }

    if args.dump {
        table.write_lists(&mut out, &alphabet)?;
    }
    out.flush()?;
    Ok(())
}
