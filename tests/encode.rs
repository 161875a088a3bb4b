use kmer_index_table::*;

#[test]
fn test_kmer_index_round_trip_through_letters() {
    let alphabet = Alphabet::amino_acid();
    let indexer = Indexer::new(alphabet.size(), 3).unwrap();
    assert_eq!(indexer.table_size(), 21 * 21 * 21);

    let codes = alphabet.encode(b"WAX").unwrap();
    let idx = indexer.int2index(&codes);
    // most significant residue first
    assert_eq!(idx, 17 * 21 * 21 + 20);
    assert_eq!(indexer.kmer_string(idx, &alphabet), "WAX");

    let mut back = [0u8; 3];
    indexer.index2int(idx, &mut back);
    assert_eq!(back.to_vec(), codes);
}

#[test]
fn test_nucleotide_indices_are_dense() {
    let alphabet = Alphabet::nucleotide();
    let indexer = Indexer::new(alphabet.size(), 2).unwrap();
    let all: Vec<u32> = [b"AA", b"AC", b"AG", b"AT", b"CA", b"TT"]
        .iter()
        .map(|k| indexer.int2index(&alphabet.encode(*k).unwrap()))
        .collect();
    assert_eq!(all, vec![0, 1, 2, 3, 4, 15]);
}

#[test]
fn test_indexer_rejects_oversized_tables() {
    assert!(matches!(
        Indexer::new(21, 8),
        Err(IndexError::TableTooLarge { .. })
    ));
    assert!(matches!(
        Indexer::new(21, 0),
        Err(IndexError::InvalidKmerSize(0))
    ));
    assert!(Indexer::new(21, 7).is_ok());
}

#[test]
fn test_sequence_windows_match_cursor() {
    let alphabet = Alphabet::nucleotide();
    let codes = alphabet.encode(b"GATTACA").unwrap();
    let mut seq = Sequence::new(4, &codes, 3);
    assert_eq!(seq.window_count(), 5);

    let from_iter: Vec<(usize, Vec<u8>)> = seq.kmers().map(|(p, w)| (p, w.to_vec())).collect();
    let mut from_cursor = Vec::new();
    while seq.has_next_kmer() {
        let w = seq.next_kmer().to_vec();
        from_cursor.push((seq.current_position(), w));
    }
    assert_eq!(from_iter, from_cursor);
    assert_eq!(alphabet.decode(&from_iter[4].1), b"ACA".to_vec());
}

#[test]
fn test_short_sequence_has_no_windows() {
    let seq = Sequence::new(0, &[1, 2], 3);
    assert_eq!(seq.window_count(), 0);
    assert!(!seq.has_next_kmer());
    assert_eq!(seq.kmers().len(), 0);
}
