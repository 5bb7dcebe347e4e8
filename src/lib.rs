//! Reader for Mobipocket/KF8 e-book files.
//!
//! Mobipocket books are Palm Database (PDB) containers: a framed list of
//! records whose record 0 carries the PalmDoc, MOBI, and EXTH headers. This
//! crate parses the container and headers, expands the text records through
//! the codec the headers name (stored, PalmDoc RLE, or Huffdic), and exposes
//! metadata, reading-order text, embedded images, and a thumbnail.
//!
//! Input is untrusted: malformed files degrade to an invalid [`Document`]
//! that still serves whatever could be parsed, and never panic. DRM is
//! detected and reported, not bypassed; DRMed books keep their metadata and
//! images readable while text stays empty.
//!
//! ```no_run
//! use std::fs::File;
//! use mobi_reader::{Document, MetaKey};
//!
//! let file = File::open("book.mobi")?;
//! let doc = Document::open(file);
//! if let Some(title) = doc.metadata().get(&MetaKey::Title) {
//!     println!("{title:?}");
//! }
//! println!("{} characters", doc.text().chars().count());
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod mobi;

pub use mobi::compression::Decompressor;
pub use mobi::error::{MobiError, Result};
pub use mobi::header::{Compression, MobiHeader, PalmDocHeader};
pub use mobi::images::{ImageData, ImageFormat};
pub use mobi::metadata::{MetaKey, MetaValue, Metadata};
pub use mobi::pdb::{PdbFile, PdbHeader};
pub use mobi::Document;
