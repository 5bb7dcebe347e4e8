//! Core Mobipocket reader module.
//!
//! [`Document`] ties the layers together: the PDB container frames the
//! records, record 0 names the codec and carries the headers and metadata,
//! and the decompressor expands the text records.

pub mod bitreader;
pub mod compression;
pub mod error;
pub mod header;
mod html_meta;
pub mod images;
pub mod metadata;
pub mod pdb;
pub mod trailers;
mod utils;

use std::cell::Cell;
use std::io::{Read, Seek};

use log::{debug, info, warn};

use compression::Decompressor;
use error::MobiError;
use header::{Compression, MobiHeader, PalmDocHeader, MOBI_NOTSET};
use images::{sniff_image, ImageData};
use metadata::{MetaKey, MetaValue, Metadata};
use pdb::{PdbFile, PdbHeader};
use trailers::strip_trailers;

/// A parsed Mobipocket/KF8 document.
///
/// Construction never fails outright: malformed input degrades to an
/// invalid document that still serves whatever could be parsed, and every
/// query on an invalid document returns an empty or absent value instead of
/// erroring. Check [`is_valid`](Self::is_valid) to distinguish the cases.
///
/// With DRM present, metadata and images stay readable but
/// [`text`](Self::text) returns an empty string.
pub struct Document<R> {
    pdb: Option<PdbFile<R>>,
    palmdoc: Option<PalmDocHeader>,
    mobi: MobiHeader,
    dec: Option<Decompressor>,
    metadata: Metadata,
    drm: bool,
    valid: Cell<bool>,
    /// First record holding an image, located lazily. Zero means not yet
    /// located; record 0 can never be an image.
    first_image_record: Cell<u16>,
    /// Image index of the thumbnail, relative to the first image record.
    thumbnail_index: Cell<u32>,
}

impl<R: Read + Seek> Document<R> {
    /// Parse a document from a seekable byte source.
    pub fn open(source: R) -> Self {
        let pdb = match PdbFile::read(source) {
            Ok(pdb) => pdb,
            Err(error) => {
                debug!("unreadable PDB container: {error}");
                return Self::empty(None);
            }
        };

        let db_type = pdb.header().database_type;
        if &db_type != b"BOOK" && &db_type != b"TEXt" {
            let error =
                MobiError::UnsupportedDatabaseType(String::from_utf8_lossy(&db_type).into_owned());
            debug!("{error}");
            return Self::empty(Some(pdb));
        }

        let Some(record0) = pdb.record(0) else {
            debug!("record 0 is unreadable");
            return Self::empty(Some(pdb));
        };
        let palmdoc = match PalmDocHeader::parse(&record0) {
            Ok(header) => header,
            Err(error) => {
                debug!("{error}");
                return Self::empty(Some(pdb));
            }
        };
        let mobi = MobiHeader::parse(&record0);
        let drm = palmdoc.encryption_type != 0;
        let metadata = header::parse_metadata(&record0, &mobi);

        // Huffdic needs its auxiliary records up front; the other codecs
        // take none.
        let aux = match Compression::try_from(palmdoc.compression) {
            Ok(Compression::Huffdic) => huff_records(&pdb, &mobi),
            _ => Vec::new(),
        };
        let dec = Decompressor::create(palmdoc.compression, aux);

        let valid = mobi.has_mobi_magic && dec.as_ref().is_some_and(Decompressor::is_valid);
        let thumbnail_index = metadata
            .get(&MetaKey::ThumbnailOffset)
            .and_then(MetaValue::as_number)
            .unwrap_or(0);

        let mut doc = Self {
            pdb: Some(pdb),
            palmdoc: Some(palmdoc),
            mobi,
            dec,
            metadata,
            drm,
            valid: Cell::new(valid),
            first_image_record: Cell::new(0),
            thumbnail_index: Cell::new(thumbnail_index),
        };

        // Sparse metadata and no DRM: fall back to Dublin-Core tags in the
        // first text record.
        if doc.metadata.len() < 2 && !doc.drm {
            doc.scrape_html_metadata();
        }

        info!(
            "document opened: valid={} drm={} {} metadata keys",
            doc.valid.get(),
            doc.drm,
            doc.metadata.len()
        );
        doc
    }

    fn empty(pdb: Option<PdbFile<R>>) -> Self {
        Self {
            pdb,
            palmdoc: None,
            mobi: MobiHeader::default(),
            dec: None,
            metadata: Metadata::new(),
            drm: false,
            valid: Cell::new(false),
            first_image_record: Cell::new(0),
            thumbnail_index: Cell::new(0),
        }
    }

    fn scrape_html_metadata(&mut self) {
        let (Some(pdb), Some(dec)) = (&self.pdb, &self.dec) else {
            return;
        };
        let Some(record1) = pdb.record(1) else {
            return;
        };
        let expanded = dec.decompress(&record1);
        let (html, _, _) = self.mobi.encoding().decode(&expanded);
        html_meta::scrape_dublin_core(&html, &mut self.metadata);
    }

    /// Whether the container, headers, and codec all parsed. A document
    /// whose decompressor poisons mid-stream turns invalid as well.
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Whether the text records are DRM encrypted. Metadata and images are
    /// still readable on DRMed documents.
    pub fn has_drm(&self) -> bool {
        self.drm
    }

    /// The parsed metadata. Populated on a best-effort basis even when the
    /// document is invalid.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The PDB container header, when the container parsed at all.
    pub fn pdb_header(&self) -> Option<&PdbHeader> {
        self.pdb.as_ref().map(PdbFile::header)
    }

    /// The MOBI header fields of record 0.
    pub fn mobi_header(&self) -> &MobiHeader {
        &self.mobi
    }

    /// The PalmDoc header of record 0.
    pub fn palmdoc_header(&self) -> Option<&PalmDocHeader> {
        self.palmdoc.as_ref()
    }

    /// The whole book text, decoded with the document's declared encoding.
    pub fn text(&self) -> String {
        self.text_limited(usize::MAX)
    }

    /// Like [`text`](Self::text), but stops concatenating records once the
    /// assembled byte length exceeds `limit`. The result may run slightly
    /// past the limit; it is a fetch bound, not an exact cut.
    pub fn text_limited(&self, limit: usize) -> String {
        if !self.valid.get() || self.drm {
            return String::new();
        }
        let (Some(pdb), Some(palmdoc), Some(dec)) = (&self.pdb, &self.palmdoc, &self.dec) else {
            return String::new();
        };
        let extra_flags = u32::from(self.mobi.extra_flags.unwrap_or(0));
        let max_chunk = usize::from(palmdoc.max_record_size);

        let mut whole = Vec::new();
        for i in 1..=palmdoc.text_record_count {
            let Some(record) = pdb.record(i) else {
                continue;
            };
            let mut chunk = dec.decompress(strip_trailers(&record, extra_flags));
            if !dec.is_valid() {
                warn!("decompressor failed on record {i}");
                self.valid.set(false);
                return String::new();
            }
            chunk.truncate(max_chunk);
            whole.extend_from_slice(&chunk);
            if whole.len() > limit {
                break;
            }
        }
        let (text, _, _) = self.mobi.encoding().decode(&whole);
        text.into_owned()
    }

    /// Number of records following the text, which approximates the image
    /// count. FLIS/FCIS trailer records are included in this figure.
    pub fn image_count(&self) -> u16 {
        let Some(pdb) = &self.pdb else { return 0 };
        let ntext = self.palmdoc.as_ref().map_or(0, |h| h.text_record_count);
        pdb.record_count().saturating_sub(ntext)
    }

    /// The `index`-th image, counted from the first image record.
    pub fn image(&self, index: usize) -> Option<ImageData> {
        if index > usize::from(u16::MAX) {
            return None;
        }
        let first = self.locate_first_image()?;
        let pdb = self.pdb.as_ref()?;
        let record_index = u16::try_from(usize::from(first) + index).ok()?;
        if record_index >= pdb.record_count() {
            return None;
        }
        let bytes = pdb.record(record_index)?;
        let format = sniff_image(&bytes)?;
        Some(ImageData { format, bytes })
    }

    /// The cover thumbnail named by the EXTH metadata, or the first image
    /// when that index does not decode.
    pub fn thumbnail(&self) -> Option<ImageData> {
        let index = self.thumbnail_index.get() as usize;
        let image = self.image(index);
        if image.is_none() && index != 0 {
            self.thumbnail_index.set(0);
            return self.image(0);
        }
        image
    }

    /// Find and cache the first record that sniffs as an image.
    ///
    /// The MOBI header names the record when it is set; otherwise the scan
    /// starts right after the text records, where images usually sit.
    fn locate_first_image(&self) -> Option<u16> {
        if self.first_image_record.get() != 0 {
            return Some(self.first_image_record.get());
        }
        let pdb = self.pdb.as_ref()?;
        let start = match self.mobi.image_index {
            Some(index) if index != 0 && index != MOBI_NOTSET => u16::try_from(index).ok()?,
            _ => {
                let ntext = self.palmdoc.as_ref()?.text_record_count;
                ntext.checked_add(1)?
            }
        };
        for i in start..pdb.record_count() {
            let record = pdb.record(i)?;
            if sniff_image(&record).is_some() {
                self.first_image_record.set(i);
                return Some(i);
            }
        }
        None
    }
}

/// Collect the HUFF record and its CDIC companions.
///
/// Any missing record empties the set, which leaves the Huffdic setup
/// invalid and the document unable to produce text.
fn huff_records<R: Read + Seek>(pdb: &PdbFile<R>, mobi: &MobiHeader) -> Vec<Vec<u8>> {
    let (Some(index), Some(count)) = (mobi.huff_rec_index, mobi.huff_rec_count) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for i in 0..count {
        let record = index
            .checked_add(i)
            .and_then(|n| u16::try_from(n).ok())
            .and_then(|n| pdb.record(n));
        match record {
            Some(record) => records.push(record),
            None => {
                warn!("Huffdic auxiliary record {} of {count} is missing", i + 1);
                return Vec::new();
            }
        }
    }
    records
}
