//! Typed book metadata and the EXTH tag catalogue.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Keys under which parsed metadata is stored.
///
/// Most correspond to EXTH tags; `Title` may also come from the full-name
/// field of the MOBI header or the Dublin-Core HTML fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaKey {
    Title,
    Author,
    Publisher,
    Description,
    Subject,
    Copyright,
    Language,
    Isbn,
    PublishingDate,
    Contributor,
    Source,
    Asin,
    StartReading,
    Kf8BoundaryOffset,
    CountResources,
    Kf8CoverUri,
    RescOffset,
    CoverOffset,
    ThumbnailOffset,
    HasFakeCover,
    CreatorSoftware,
    CreatorMajorVersion,
    CreatorMinorVersion,
    CreatorBuildNumber,
    CreatorBuildRevision,
    Doctype,
    UpdatedTitle,
    /// EXTH tag with no entry in the catalogue; the payload is kept verbatim.
    Unknown(u32),
}

/// A metadata value, tagged by how the EXTH payload was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Number(u32),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }
}

/// The metadata map exposed by a document.
pub type Metadata = BTreeMap<MetaKey, MetaValue>;

/// How an EXTH payload is to be interpreted.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TagKind {
    Text,
    Number,
    Date,
    Bytes,
}

/// EXTH tag catalogue: tag id to storage key and payload interpretation.
pub(crate) fn exth_tag(tag: u32) -> (MetaKey, TagKind) {
    use MetaKey::*;
    use TagKind::*;
    match tag {
        100 => (Author, Text),
        101 => (Publisher, Text),
        103 => (Description, Text),
        104 => (Isbn, Text),
        105 => (Subject, Text),
        106 => (PublishingDate, Date),
        108 => (Contributor, Text),
        109 => (Copyright, Text),
        112 => (Source, Text),
        113 => (Asin, Text),
        116 => (StartReading, Number),
        121 => (Kf8BoundaryOffset, Number),
        125 => (CountResources, Number),
        129 => (Kf8CoverUri, Text),
        131 => (RescOffset, Number),
        201 => (CoverOffset, Number),
        202 => (ThumbnailOffset, Number),
        203 => (HasFakeCover, Number),
        204 => (CreatorSoftware, Number),
        205 => (CreatorMajorVersion, Number),
        206 => (CreatorMinorVersion, Number),
        207 => (CreatorBuildNumber, Number),
        501 => (Doctype, Text),
        503 => (UpdatedTitle, Text),
        524 => (Language, Text),
        535 => (CreatorBuildRevision, Text),
        other => (Unknown(other), Bytes),
    }
}

/// Parse an EXTH date-time payload.
///
/// Payloads are usually ISO-8601 ("2025-04-28T18:16:24.255000+00:00"); some
/// producers write a space-separated form with a fractional-second suffix
/// ("2025-04-28 18:16:24.255+00:00"), and a few omit the zone entirely.
pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc3339_payloads() {
        let parsed = parse_datetime("2025-04-28T18:16:24.255000+00:00").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 4, 28, 18, 16, 24).unwrap()
            + chrono::Duration::milliseconds(255);
        assert_eq!(parsed, expected);

        assert_eq!(
            parse_datetime("2020-01-02T03:04:05Z").unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
        );
    }

    #[test]
    fn fractional_suffix_fallback() {
        let parsed = parse_datetime("2025-04-28 18:16:24.255+00:00").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 4, 28, 18, 16, 24).unwrap()
            + chrono::Duration::milliseconds(255);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn zoneless_payloads_assume_utc() {
        assert_eq!(
            parse_datetime("2019-12-31 23:59:58").unwrap(),
            Utc.with_ymd_and_hms(2019, 12, 31, 23, 59, 58).unwrap()
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn unknown_tags_keep_their_id() {
        let (key, _) = exth_tag(9999);
        assert_eq!(key, MetaKey::Unknown(9999));
    }
}
