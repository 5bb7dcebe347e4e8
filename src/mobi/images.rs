//! Image record detection.
//!
//! Pixel decoding is out of scope for this crate. Image records are sniffed
//! by their magic bytes and handed back as tagged bytes for the caller's
//! decoder of choice.

/// Image container formats that occur in MOBI files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

/// An embedded image: the raw record bytes plus the sniffed format.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Sniff PNG/JPEG/GIF magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    if infer::image::is_png(bytes) {
        Some(ImageFormat::Png)
    } else if infer::image::is_jpeg(bytes) {
        Some(ImageFormat::Jpeg)
    } else if infer::image::is_gif(bytes) {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}
