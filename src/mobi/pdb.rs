//! PDB (Palm Database) container parsing.
//!
//! A PDB file is a 78-byte header followed by a table of record entries and
//! the record payloads themselves. Records are addressed by absolute file
//! offsets; record `i` runs from its own offset to the next record's offset,
//! and the last record runs to the end of the file.
//!
//! See <https://en.wikipedia.org/wiki/PDB_(Palm_OS)> for the layout.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::error::{MobiError, Result};

/// Size of the fixed PDB header.
const PDB_HEADER_LEN: usize = 0x4e;

/// Seconds between the Mac epoch (1904) and the Unix epoch (1970).
const EPOCH_MAC_DIFF: i64 = 2_082_844_800;

/// 1996-01-01 as Unix seconds. Plausible PDB timestamps are at or after it;
/// smaller non-zero values were written little-endian.
const UNIX_1996: u32 = 820_454_400;

/// Normalize a PDB timestamp to UTC.
///
/// Timestamps occur in three conventions in the wild: Unix seconds,
/// byte-swapped Unix seconds, and Mac-epoch seconds (high bit set).
pub(crate) fn from_pdb_time(raw: u32) -> DateTime<Utc> {
    let mut raw = raw;
    if raw > 0 && raw < UNIX_1996 {
        raw = raw.swap_bytes();
    }
    let mut secs = i64::from(raw);
    if raw & 0x8000_0000 != 0 {
        secs -= EPOCH_MAC_DIFF;
    }
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// The fixed PDB file header.
#[derive(Debug, Clone)]
pub struct PdbHeader {
    /// Database name, zero padded.
    pub name: [u8; 32],
    pub attributes: u16,
    pub version: u16,
    /// Raw creation timestamp, see [`PdbHeader::creation_time`].
    pub ctime: u32,
    pub mtime: u32,
    pub btime: u32,
    pub modification_number: u32,
    pub app_info_offset: u32,
    pub sort_info_offset: u32,
    /// Database type, "BOOK" for Mobipocket e-books.
    pub database_type: [u8; 4],
    pub creator: [u8; 4],
    pub uid: u32,
    /// Offset of the next record list. Unused by readers.
    pub next_record: u32,
    /// Record count as declared by the header. The usable count may be
    /// smaller when the offset table is truncated.
    pub record_count: u16,
}

impl PdbHeader {
    /// The database name with the zero padding removed.
    pub fn name_lossy(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        from_pdb_time(self.ctime)
    }

    pub fn modification_time(&self) -> DateTime<Utc> {
        from_pdb_time(self.mtime)
    }

    pub fn backup_time(&self) -> DateTime<Utc> {
        from_pdb_time(self.btime)
    }
}

/// One entry of the record offset table.
#[derive(Debug, Clone, Copy)]
pub struct PdbRecordEntry {
    /// Absolute byte offset of the record payload.
    pub offset: u32,
    pub attributes: u8,
    /// 24-bit record unique id.
    pub uid: u32,
}

/// A parsed PDB container over a seekable byte source.
///
/// Parsing reads the header and offset table once; record payloads are read
/// on demand. The source lives behind a `RefCell` so record access takes
/// `&self`; the crate's contract is single-threaded.
pub struct PdbFile<R> {
    source: RefCell<R>,
    header: PdbHeader,
    records: Vec<PdbRecordEntry>,
    file_size: u64,
}

impl<R: Read + Seek> PdbFile<R> {
    /// Parse the header and record offset table.
    ///
    /// An offset beyond the end of the file truncates the table there (the
    /// remaining records are simply unavailable); an offset that regresses
    /// is fatal.
    pub fn read(mut source: R) -> Result<Self> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let header = read_header(&mut source)?;
        if header.record_count == 0 {
            return Err(MobiError::NoRecords);
        }

        let count = usize::from(header.record_count);
        let mut table = vec![0u8; 8 * count];
        source
            .read_exact(&mut table)
            .map_err(|_| MobiError::Truncated {
                what: "record offset table",
                needed: 8 * count,
            })?;

        let mut entries = table.as_slice();
        let mut records = Vec::with_capacity(count);
        // The first record must start past the header and offset table.
        let mut previous = (PDB_HEADER_LEN + 8 * count - 1) as u32;
        for index in 0..count {
            let offset = entries.read_u32::<BigEndian>()?;
            let attributes = entries.read_u8()?;
            let uid_high = entries.read_u8()?;
            let uid_low = entries.read_u16::<BigEndian>()?;
            if offset < previous {
                return Err(MobiError::OffsetRegression {
                    index,
                    offset,
                    previous,
                });
            }
            if u64::from(offset) > file_size {
                warn!("record {index} starts at {offset:#x}, past the end of the file; ignoring the rest of the table");
                break;
            }
            records.push(PdbRecordEntry {
                offset,
                attributes,
                uid: u32::from(uid_high) << 16 | u32::from(uid_low),
            });
            previous = offset;
        }

        debug!(
            "PDB container \"{}\": type {:?}, {} of {} records usable",
            header.name_lossy(),
            String::from_utf8_lossy(&header.database_type),
            records.len(),
            header.record_count
        );

        Ok(Self {
            source: RefCell::new(source),
            header,
            records,
            file_size,
        })
    }

    /// The bytes of record `i`, or `None` when the record is absent or
    /// unreadable. Absent is not the same as empty.
    pub fn record(&self, i: u16) -> Option<Vec<u8>> {
        let entry = self.records.get(usize::from(i))?;
        let start = u64::from(entry.offset);
        let end = self
            .records
            .get(usize::from(i) + 1)
            .map_or(self.file_size, |next| u64::from(next.offset));

        let mut source = self.source.borrow_mut();
        source.seek(SeekFrom::Start(start)).ok()?;
        let mut data = vec![0u8; (end - start) as usize];
        source.read_exact(&mut data).ok()?;
        Some(data)
    }

    /// Number of usable records.
    pub fn record_count(&self) -> u16 {
        self.records.len() as u16
    }

    pub fn header(&self) -> &PdbHeader {
        &self.header
    }

    /// The record table entries, including attributes and uids.
    pub fn record_entries(&self) -> &[PdbRecordEntry] {
        &self.records
    }
}

fn read_header<R: Read>(source: &mut R) -> Result<PdbHeader> {
    let mut head = [0u8; PDB_HEADER_LEN];
    source
        .read_exact(&mut head)
        .map_err(|_| MobiError::Truncated {
            what: "PDB header",
            needed: PDB_HEADER_LEN,
        })?;

    let mut reader = &head[..];
    let mut name = [0u8; 32];
    reader.read_exact(&mut name)?;
    let attributes = reader.read_u16::<BigEndian>()?;
    let version = reader.read_u16::<BigEndian>()?;
    let ctime = reader.read_u32::<BigEndian>()?;
    let mtime = reader.read_u32::<BigEndian>()?;
    let btime = reader.read_u32::<BigEndian>()?;
    let modification_number = reader.read_u32::<BigEndian>()?;
    let app_info_offset = reader.read_u32::<BigEndian>()?;
    let sort_info_offset = reader.read_u32::<BigEndian>()?;
    let mut database_type = [0u8; 4];
    reader.read_exact(&mut database_type)?;
    let mut creator = [0u8; 4];
    reader.read_exact(&mut creator)?;
    let uid = reader.read_u32::<BigEndian>()?;
    let next_record = reader.read_u32::<BigEndian>()?;
    let record_count = reader.read_u16::<BigEndian>()?;

    Ok(PdbHeader {
        name,
        attributes,
        version,
        ctime,
        mtime,
        btime,
        modification_number,
        app_info_offset,
        sort_info_offset,
        database_type,
        creator,
        uid,
        next_record,
        record_count,
    })
}
