//! PalmDoc and MOBI header parsing, including the EXTH metadata block.
//!
//! Record 0 of the container starts with the 16-byte PalmDoc header, followed
//! by the variable-length MOBI header and, when flagged, the EXTH block. The
//! MOBI header grew field by field across format versions, so every read is
//! bounds-checked and a field past the end of the record is simply absent.

use byteorder::{BigEndian, ByteOrder};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::{debug, trace, warn};

use super::error::{MobiError, Result};
use super::metadata::{exth_tag, parse_datetime, MetaKey, MetaValue, Metadata, TagKind};
use super::utils::{bytes_at, read_u16_at, read_u32_at};

/// Value used by MOBI headers for "no such record".
pub const MOBI_NOTSET: u32 = 0xffff_ffff;

/// The codec named by the PalmDoc compression field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffdic,
}

impl TryFrom<u16> for Compression {
    type Error = MobiError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::None),
            2 => Ok(Self::PalmDoc),
            // The Huffdic id is the two-byte tag 17480; reference readers
            // key on the low byte 'H'.
            v if v & 0x00ff == u16::from(b'H') => Ok(Self::Huffdic),
            other => Err(MobiError::UnsupportedCompression(other)),
        }
    }
}

/// The fixed 16-byte PalmDoc header at the start of record 0.
#[derive(Debug, Clone, Copy)]
pub struct PalmDocHeader {
    pub compression: u16,
    /// Uncompressed length of the whole book text.
    pub text_length: u32,
    /// Number of records holding book text, starting at record 1.
    pub text_record_count: u16,
    /// Maximum decompressed size of a single text record.
    pub max_record_size: u16,
    /// Non-zero means the text records are DRM encrypted.
    pub encryption_type: u16,
}

impl PalmDocHeader {
    pub(crate) fn parse(record0: &[u8]) -> Result<Self> {
        if record0.len() < 16 {
            return Err(MobiError::Truncated {
                what: "PalmDoc header",
                needed: 16,
            });
        }
        Ok(Self {
            compression: BigEndian::read_u16(&record0[0..2]),
            text_length: BigEndian::read_u32(&record0[4..8]),
            text_record_count: BigEndian::read_u16(&record0[8..10]),
            max_record_size: BigEndian::read_u16(&record0[10..12]),
            encryption_type: BigEndian::read_u16(&record0[12..14]),
        })
    }
}

/// The MOBI header following the PalmDoc header in record 0.
///
/// Field offsets below are relative to the start of record 0, as in the
/// format documentation. Offsets 192/194 and 248/252/260 changed meaning in
/// KF8 (MOBI 8) files; both interpretations are kept apart here.
#[derive(Debug, Default, Clone)]
pub struct MobiHeader {
    /// Whether bytes 16..20 spelled "MOBI". A document without the magic is
    /// reported invalid, but the remaining fields are still parsed.
    pub has_mobi_magic: bool,
    /// 20: length of the MOBI header including the magic.
    pub header_length: Option<u32>,
    /// 24: mobipocket file type.
    pub mobi_type: Option<u32>,
    /// 28: 1252 = CP1252, 65001 = UTF-8.
    pub text_encoding: Option<u32>,
    pub uid: Option<u32>,
    /// 36: mobipocket format version.
    pub version: Option<u32>,
    /// 40: orthographic meta index.
    pub orth_index: Option<u32>,
    pub infl_index: Option<u32>,
    pub names_index: Option<u32>,
    pub keys_index: Option<u32>,
    /// 56..80: extra meta indexes 0 through 5.
    pub extra_indexes: [Option<u32>; 6],
    /// 80: first record that is not book text.
    pub non_text_index: Option<u32>,
    /// 84: offset of the full book name inside record 0.
    pub full_name_offset: Option<u32>,
    pub full_name_length: Option<u32>,
    pub locale: Option<u32>,
    pub dict_input_lang: Option<u32>,
    pub dict_output_lang: Option<u32>,
    pub min_version: Option<u32>,
    /// 108: first record holding an image.
    pub image_index: Option<u32>,
    /// 112: first Huffdic compression record.
    pub huff_rec_index: Option<u32>,
    pub huff_rec_count: Option<u32>,
    pub datp_rec_index: Option<u32>,
    pub datp_rec_count: Option<u32>,
    /// 128: bit 6 set means an EXTH block follows the MOBI header.
    pub exth_flags: Option<u32>,
    pub drm_offset: Option<u32>,
    pub drm_count: Option<u32>,
    pub drm_size: Option<u32>,
    pub drm_flags: Option<u32>,
    /// 192, pre-KF8 layout.
    pub first_text_index: Option<u16>,
    /// 194, pre-KF8 layout.
    pub last_text_index: Option<u16>,
    /// 192, KF8 layout: FDST record.
    pub fdst_index: Option<u32>,
    pub fdst_section_count: Option<u32>,
    pub fcis_index: Option<u32>,
    pub fcis_count: Option<u32>,
    pub flis_index: Option<u32>,
    pub flis_count: Option<u32>,
    pub srcs_index: Option<u32>,
    pub srcs_count: Option<u32>,
    /// 242: bitmap governing per-record trailing data.
    pub extra_flags: Option<u16>,
    pub ncx_index: Option<u32>,
    /// 248, KF8 layout: fragments record.
    pub fragment_index: Option<u32>,
    /// 252, KF8 layout: SKEL record.
    pub skeleton_index: Option<u32>,
    pub datp_index: Option<u32>,
    /// 260, KF8 layout: guide record.
    pub guide_index: Option<u32>,
}

impl MobiHeader {
    pub(crate) fn parse(record0: &[u8]) -> Self {
        let mut header = Self {
            has_mobi_magic: bytes_at(record0, 16, 4) == Some(b"MOBI".as_slice()),
            header_length: read_u32_at(record0, 20),
            mobi_type: read_u32_at(record0, 24),
            text_encoding: read_u32_at(record0, 28),
            uid: read_u32_at(record0, 32),
            version: read_u32_at(record0, 36),
            orth_index: read_u32_at(record0, 40),
            infl_index: read_u32_at(record0, 44),
            names_index: read_u32_at(record0, 48),
            keys_index: read_u32_at(record0, 52),
            non_text_index: read_u32_at(record0, 80),
            full_name_offset: read_u32_at(record0, 84),
            full_name_length: read_u32_at(record0, 88),
            locale: read_u32_at(record0, 92),
            dict_input_lang: read_u32_at(record0, 96),
            dict_output_lang: read_u32_at(record0, 100),
            min_version: read_u32_at(record0, 104),
            image_index: read_u32_at(record0, 108),
            huff_rec_index: read_u32_at(record0, 112),
            huff_rec_count: read_u32_at(record0, 116),
            datp_rec_index: read_u32_at(record0, 120),
            datp_rec_count: read_u32_at(record0, 124),
            exth_flags: read_u32_at(record0, 128),
            drm_offset: read_u32_at(record0, 168),
            drm_count: read_u32_at(record0, 172),
            drm_size: read_u32_at(record0, 176),
            drm_flags: read_u32_at(record0, 180),
            fdst_section_count: read_u32_at(record0, 196),
            fcis_index: read_u32_at(record0, 200),
            fcis_count: read_u32_at(record0, 204),
            flis_index: read_u32_at(record0, 208),
            flis_count: read_u32_at(record0, 212),
            srcs_index: read_u32_at(record0, 224),
            srcs_count: read_u32_at(record0, 228),
            extra_flags: read_u16_at(record0, 242),
            ncx_index: read_u32_at(record0, 244),
            datp_index: read_u32_at(record0, 256),
            ..Self::default()
        };
        for (i, slot) in header.extra_indexes.iter_mut().enumerate() {
            *slot = read_u32_at(record0, 56 + 4 * i);
        }

        if header.is_kf8() {
            header.fdst_index = read_u32_at(record0, 192);
            header.fragment_index = read_u32_at(record0, 248);
            header.skeleton_index = read_u32_at(record0, 252);
            header.guide_index = read_u32_at(record0, 260);
        } else {
            header.first_text_index = read_u16_at(record0, 192);
            header.last_text_index = read_u16_at(record0, 194);
        }

        if !header.has_mobi_magic {
            warn!("record 0 carries no MOBI magic");
        }
        header
    }

    /// KF8 (MOBI 8) files reuse several legacy header offsets for the
    /// FDST/fragment/skeleton/guide records.
    pub fn is_kf8(&self) -> bool {
        self.version == Some(8) && self.header_length.is_some_and(|len| len >= 0xe4)
    }

    /// The character encoding of the book text and string metadata.
    pub fn encoding(&self) -> &'static Encoding {
        match self.text_encoding {
            Some(65001) => UTF_8,
            // 1252 and anything unknown: CP1252, a superset of Latin-1.
            _ => WINDOWS_1252,
        }
    }
}

/// Extract the full-name title and EXTH metadata from record 0.
pub(crate) fn parse_metadata(record0: &[u8], mobi: &MobiHeader) -> Metadata {
    let mut metadata = Metadata::new();
    let encoding = mobi.encoding();

    // The full book name lives inside record 0 itself. A zero-length name
    // still stores an (empty) title.
    if let (Some(offset), Some(length)) = (mobi.full_name_offset, mobi.full_name_length) {
        let length = (length as usize).min(1024);
        if let Some(raw) = bytes_at(record0, offset as usize, length) {
            let (title, _, _) = encoding.decode(raw);
            metadata.insert(MetaKey::Title, MetaValue::Text(title.into_owned()));
        }
    }

    if mobi.exth_flags.unwrap_or(0) & 0x40 != 0 {
        parse_exth(record0, mobi, encoding, &mut metadata);
    }
    metadata
}

/// Walk the EXTH tag-length-value block.
///
/// The block sits right after the MOBI header. Any bounds violation stops
/// the walk; whatever was extracted before it is kept.
fn parse_exth(
    record0: &[u8],
    mobi: &MobiHeader,
    encoding: &'static Encoding,
    metadata: &mut Metadata,
) {
    let Some(header_length) = mobi.header_length else {
        return;
    };
    let exth_start = (header_length as usize).saturating_add(16);
    if bytes_at(record0, exth_start, 4) != Some(b"EXTH".as_slice()) {
        debug!("EXTH flag set but no EXTH magic at offset {exth_start}");
        return;
    }
    let Some(count) = read_u32_at(record0, exth_start + 8) else {
        return;
    };

    let mut offset = exth_start + 12;
    for _ in 0..count {
        let (Some(tag), Some(length)) = (
            read_u32_at(record0, offset),
            read_u32_at(record0, offset + 4),
        ) else {
            break;
        };
        let length = length as usize;
        // An entry shorter than its own tag/length prefix would never
        // advance the cursor.
        if length < 8 {
            break;
        }
        let Some(payload) = bytes_at(record0, offset + 8, length - 8) else {
            break;
        };
        store_exth_entry(tag, payload, encoding, metadata);
        offset += length;
    }
}

fn store_exth_entry(
    tag: u32,
    payload: &[u8],
    encoding: &'static Encoding,
    metadata: &mut Metadata,
) {
    let (key, kind) = exth_tag(tag);
    let value = match kind {
        TagKind::Text => {
            let (text, _, _) = encoding.decode(payload);
            MetaValue::Text(text.into_owned())
        }
        TagKind::Number => match read_u32_at(payload, 0) {
            Some(value) => MetaValue::Number(value),
            None => return,
        },
        TagKind::Date => {
            let (text, _, _) = encoding.decode(payload);
            match parse_datetime(&text) {
                Some(date) => MetaValue::Date(date),
                // Keep unparseable dates as text rather than dropping them.
                None => MetaValue::Text(text.into_owned()),
            }
        }
        TagKind::Bytes => MetaValue::Bytes(payload.to_vec()),
    };
    trace!("EXTH tag {tag} stored as {key:?}");
    metadata.insert(key, value);
}
