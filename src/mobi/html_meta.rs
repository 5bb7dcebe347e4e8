//! Dublin-Core metadata scraped from the book HTML.
//!
//! Old PalmDoc-era files often carry no EXTH block; their metadata sits as
//! `<dc:...>` tags inside the first text record. This fallback only runs
//! when the headers produced fewer than two metadata keys.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use super::metadata::{MetaKey, MetaValue, Metadata};

static DC_PATTERNS: OnceLock<Vec<(MetaKey, Regex)>> = OnceLock::new();

fn dc_patterns() -> &'static [(MetaKey, Regex)] {
    DC_PATTERNS.get_or_init(|| {
        let tag = |name: &str, key: MetaKey| {
            // Case-insensitive and lazy; `.` stays within a single line.
            let pattern = format!("(?i)<dc:{name}.*?>(.*?)</dc:{name}>");
            (key, Regex::new(&pattern).expect("invalid Dublin-Core pattern"))
        };
        vec![
            tag("title", MetaKey::Title),
            tag("creator", MetaKey::Author),
            tag("rights", MetaKey::Copyright),
            tag("subject", MetaKey::Subject),
            tag("description", MetaKey::Description),
        ]
    })
}

/// Scrape `<dc:...>` tags out of `html` into `metadata`.
///
/// The title is only taken when the headers did not already provide one.
pub(crate) fn scrape_dublin_core(html: &str, metadata: &mut Metadata) {
    for (key, pattern) in dc_patterns() {
        if *key == MetaKey::Title && metadata.contains_key(&MetaKey::Title) {
            continue;
        }
        if let Some(captures) = pattern.captures(html) {
            debug!("HTML fallback provided {key:?}");
            metadata.insert(*key, MetaValue::Text(captures[1].to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><head>
        <dc:Title>Moon Travel</dc:Title>
        <dc:creator opf:role="aut">H. G. Wells</dc:creator>
        <dc:rights>Public Domain</dc:rights>
        <dc:subject>Fiction</dc:subject>
        <dc:description>Two men reach the Moon.</dc:description>
        </head><body></body></html>"#;

    #[test]
    fn scrapes_all_five_tags() {
        let mut metadata = Metadata::new();
        scrape_dublin_core(HTML, &mut metadata);

        assert_eq!(metadata[&MetaKey::Title], MetaValue::Text("Moon Travel".into()));
        assert_eq!(
            metadata[&MetaKey::Author],
            MetaValue::Text("H. G. Wells".into())
        );
        assert_eq!(
            metadata[&MetaKey::Copyright],
            MetaValue::Text("Public Domain".into())
        );
        assert_eq!(metadata[&MetaKey::Subject], MetaValue::Text("Fiction".into()));
        assert_eq!(
            metadata[&MetaKey::Description],
            MetaValue::Text("Two men reach the Moon.".into())
        );
    }

    #[test]
    fn tags_spanning_lines_are_not_matched() {
        let mut metadata = Metadata::new();
        scrape_dublin_core(
            "<html><dc:subject>split\nacross lines</dc:subject></html>",
            &mut metadata,
        );
        assert!(!metadata.contains_key(&MetaKey::Subject));
    }

    #[test]
    fn existing_title_is_kept() {
        let mut metadata = Metadata::new();
        metadata.insert(MetaKey::Title, MetaValue::Text("From EXTH".into()));
        scrape_dublin_core(HTML, &mut metadata);
        assert_eq!(metadata[&MetaKey::Title], MetaValue::Text("From EXTH".into()));
        assert!(metadata.contains_key(&MetaKey::Author));
    }

    #[test]
    fn absent_tags_add_nothing() {
        let mut metadata = Metadata::new();
        scrape_dublin_core("<html><body>plain text</body></html>", &mut metadata);
        assert!(metadata.is_empty());
    }
}
