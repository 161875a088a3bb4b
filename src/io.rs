//! On-disk `.kit` format: header + offsets + entries [+ sequence lookup].
//! Sections are 8-byte aligned. All integers are little-endian.
//!
//! Layout
//! - header (72 bytes, see [`FileHeader`])
//! - offsets: `table_size + 1` × u64
//! - entries: `entry_count` × 6-byte [`IndexEntry`]
//! - lookup (optional): `lookup_count + 1` × u64 offsets, then residue codes
//!
//! A written file is mapped back with [`MappedIndex::open`]; the offsets and
//! entries are used in place, without copying.

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use crate::index::{IndexEntry, IndexError, IndexTable};
use crate::lookup::SequenceLookup;

pub const KIT_MAGIC: u32 = 0x4B_49_54_31; // "KIT1"
pub const KIT_VERSION: u32 = 1;
pub const HEADER_LEN: u64 = 72;

const FLAG_LOOKUP: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub alphabet_size: u16,
    pub kmer_size: u16,
    pub flags: u32,
    pub table_size: u64,
    pub sequence_count: u64,
    pub entry_count: u64,
    pub offsets_off: u64,
    pub entries_off: u64,
    pub lookup_off: u64,
    pub lookup_count: u64,
}

impl FileHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LE>(self.magic)?;
        w.write_u32::<LE>(self.version)?;
        w.write_u16::<LE>(self.alphabet_size)?;
        w.write_u16::<LE>(self.kmer_size)?;
        w.write_u32::<LE>(self.flags)?;
        w.write_u64::<LE>(self.table_size)?;
        w.write_u64::<LE>(self.sequence_count)?;
        w.write_u64::<LE>(self.entry_count)?;
        w.write_u64::<LE>(self.offsets_off)?;
        w.write_u64::<LE>(self.entries_off)?;
        w.write_u64::<LE>(self.lookup_off)?;
        w.write_u64::<LE>(self.lookup_count)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(FileHeader {
            magic: r.read_u32::<LE>()?,
            version: r.read_u32::<LE>()?,
            alphabet_size: r.read_u16::<LE>()?,
            kmer_size: r.read_u16::<LE>()?,
            flags: r.read_u32::<LE>()?,
            table_size: r.read_u64::<LE>()?,
            sequence_count: r.read_u64::<LE>()?,
            entry_count: r.read_u64::<LE>()?,
            offsets_off: r.read_u64::<LE>()?,
            entries_off: r.read_u64::<LE>()?,
            lookup_off: r.read_u64::<LE>()?,
            lookup_count: r.read_u64::<LE>()?,
        })
    }

    #[inline]
    pub fn has_lookup(&self) -> bool {
        self.flags & FLAG_LOOKUP != 0
    }
}

#[inline]
fn align8(pos: u64) -> u64 {
    (pos + 7) & !7
}

/// Pad the stream with zeros up to the next 8-byte boundary.
fn pad_to_align8<W: Write>(w: &mut W, pos: u64) -> std::io::Result<u64> {
    let aligned = align8(pos);
    w.write_all(&[0u8; 8][..(aligned - pos) as usize])?;
    Ok(aligned)
}

/// Writer that serializes an [`IndexTable`] to a `.kit` file.
pub struct IndexWriter<'t, 'a> {
    table: &'t IndexTable<'a>,
}

impl<'t, 'a> IndexWriter<'t, 'a> {
    pub fn new(table: &'t IndexTable<'a>) -> Self {
        Self { table }
    }

    /// Serialize to disk. The produced file is mmap-friendly and deterministic.
    pub fn write_to(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        let t = self.table;
        let lookup = t.sequence_lookup();

        let mut header = FileHeader {
            magic: KIT_MAGIC,
            version: KIT_VERSION,
            alphabet_size: t.alphabet_size() as u16,
            kmer_size: t.kmer_size() as u16,
            flags: if lookup.is_some() { FLAG_LOOKUP } else { 0 },
            table_size: t.table_size() as u64,
            sequence_count: t.sequence_count() as u64,
            entry_count: t.entry_count(),
            ..FileHeader::default()
        };

        // Reserve the header; patched once section offsets are known.
        header.write_to(&mut w)?;
        let mut pos = HEADER_LEN;

        pos = pad_to_align8(&mut w, pos)?;
        header.offsets_off = pos;
        for &o in t.offsets() {
            w.write_u64::<LE>(o)?;
        }
        pos += t.offsets().len() as u64 * 8;

        pos = pad_to_align8(&mut w, pos)?;
        header.entries_off = pos;
        w.write_all(bytemuck::cast_slice::<IndexEntry, u8>(t.entries()))?;
        pos += t.entries().len() as u64 * IndexEntry::SIZE as u64;

        if let Some(l) = lookup {
            pos = pad_to_align8(&mut w, pos)?;
            header.lookup_off = pos;
            header.lookup_count = l.sequence_count() as u64;
            for &o in l.offsets() {
                w.write_u64::<LE>(o)?;
            }
            w.write_all(l.residues())?;
        }

        w.seek(SeekFrom::Start(0))?;
        header.write_to(&mut w)?;
        w.flush()?;
        log::info!(
            "wrote {} ({} entries, {} k-mer slots)",
            path.display(),
            header.entry_count,
            header.table_size
        );
        Ok(())
    }
}

/// A `.kit` file mapped read-only. [`table`](Self::table) borrows the mapping.
pub struct MappedIndex {
    map: memmap2::Mmap,
    header: FileHeader,
    lookup: Option<Arc<SequenceLookup>>,
}

impl MappedIndex {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if cfg!(target_endian = "big") {
            return Err(IndexError::Format(
                "index files can only be mapped on little-endian hosts".into(),
            ));
        }
        let file = File::open(path)?;
        let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
        if (map.len() as u64) < HEADER_LEN {
            return Err(IndexError::Format("truncated header".into()));
        }
        let header = FileHeader::read_from(&mut &map[..HEADER_LEN as usize])?;

        if header.magic != KIT_MAGIC {
            return Err(IndexError::Format("bad magic".into()));
        }
        if header.version != KIT_VERSION {
            return Err(IndexError::Format(format!(
                "unsupported version {}",
                header.version
            )));
        }
        if header.offsets_off % 8 != 0 {
            return Err(IndexError::Format("misaligned offsets section".into()));
        }
        let offsets_end = header
            .table_size
            .checked_add(1)
            .and_then(|n| n.checked_mul(8))
            .and_then(|n| n.checked_add(header.offsets_off));
        let entries_end = header
            .entry_count
            .checked_mul(IndexEntry::SIZE as u64)
            .and_then(|n| n.checked_add(header.entries_off));
        match (offsets_end, entries_end) {
            (Some(o), Some(e)) if o <= map.len() as u64 && e <= map.len() as u64 => {}
            _ => return Err(IndexError::Format("sections exceed file length".into())),
        }

        let lookup = if header.has_lookup() {
            Some(Arc::new(read_lookup(&map, &header)?))
        } else {
            None
        };

        log::debug!("mapped {} ({} bytes)", path.display(), map.len());
        Ok(MappedIndex {
            map,
            header,
            lookup,
        })
    }

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Read-only table over the mapped offsets and entries.
    pub fn table(&self) -> Result<IndexTable<'_>, IndexError> {
        let h = &self.header;
        let o_start = h.offsets_off as usize;
        let o_end = o_start + (h.table_size as usize + 1) * 8;
        let offsets: &[u64] = bytemuck::try_cast_slice(&self.map[o_start..o_end])
            .map_err(|e| IndexError::Cast(format!("{e:?}")))?;

        let e_start = h.entries_off as usize;
        let e_end = e_start + h.entry_count as usize * IndexEntry::SIZE;
        let entries: &[IndexEntry] = bytemuck::try_cast_slice(&self.map[e_start..e_end])
            .map_err(|e| IndexError::Cast(format!("{e:?}")))?;

        IndexTable::from_external(
            h.alphabet_size as usize,
            h.kmer_size as usize,
            h.sequence_count as usize,
            h.entry_count,
            offsets,
            entries,
            self.lookup.clone(),
        )
    }
}

fn read_lookup(map: &[u8], header: &FileHeader) -> Result<SequenceLookup, IndexError> {
    let truncated = || IndexError::Format("truncated sequence lookup".into());
    let start = header.lookup_off as usize;
    let n = header.lookup_count as usize + 1;
    let offsets_end = n
        .checked_mul(8)
        .and_then(|b| b.checked_add(start))
        .filter(|&end| end <= map.len())
        .ok_or_else(truncated)?;
    let mut r = &map[start..offsets_end];
    let mut offsets = Vec::with_capacity(n);
    for _ in 0..n {
        offsets.push(r.read_u64::<LE>()?);
    }
    let residues_len = offsets.last().copied().unwrap_or(0) as usize;
    let residues = map
        .get(offsets_end..offsets_end + residues_len)
        .ok_or_else(truncated)?
        .to_vec();
    SequenceLookup::from_parts(residues, offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_in_72_bytes() {
        let h = FileHeader {
            magic: KIT_MAGIC,
            version: KIT_VERSION,
            alphabet_size: 21,
            kmer_size: 6,
            flags: FLAG_LOOKUP,
            table_size: 85_766_121,
            sequence_count: 3,
            entry_count: 9,
            offsets_off: 72,
            entries_off: 686_129_048,
            lookup_off: 0,
            lookup_count: 3,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_LEN);
        assert_eq!(&buf[..4], b"1TIK");
        let back = FileHeader::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, h);
        assert!(back.has_lookup());
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.kit");
        std::fs::write(&p, vec![0u8; 100]).unwrap();
        assert!(matches!(MappedIndex::open(&p), Err(IndexError::Format(_))));
        std::fs::write(&p, b"short").unwrap();
        assert!(matches!(MappedIndex::open(&p), Err(IndexError::Format(_))));
    }
}
