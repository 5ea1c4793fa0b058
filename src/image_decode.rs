//! Page image decoding.
//! Supports JPG, PNG, WEBP, GIF (first frame), BMP and TIFF pages.

use std::path::Path;

use image::imageops::FilterType;
use image::GenericImageView;

use crate::error::Result;

/// Supported page extensions
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"];

/// Supported archive extensions
pub const SUPPORTED_ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check if a file or archive entry name is a supported page image
pub fn is_supported_image(name: &str) -> bool {
    has_extension(name, SUPPORTED_IMAGE_EXTENSIONS)
}

/// Check if a path looks like a supported archive
pub fn is_supported_archive(path: &Path) -> bool {
    path.to_str()
        .map(|name| has_extension(name, SUPPORTED_ARCHIVE_EXTENSIONS))
        .unwrap_or(false)
}

/// A decoded page, RGBA8.
///
/// Ownership moves from the provider to whichever page slot is bound to the
/// index when the result is applied; dropping it frees the pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self { pixels, width, height }
    }

    /// Memory held by the pixel buffer in bytes
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Decode an encoded page, downscaling it to fit `max_texture_side`.
///
/// A `max_texture_side` of 0 disables downscaling. Aspect ratio is preserved.
pub fn decode_page(bytes: &[u8], max_texture_side: u32) -> Result<PageImage> {
    puffin::profile_function!();

    let img = image::load_from_memory(bytes)?;
    let (w, h) = img.dimensions();
    let img = if max_texture_side > 0 && (w > max_texture_side || h > max_texture_side) {
        // `resize` keeps the aspect ratio inside (max_width, max_height).
        img.resize(max_texture_side, max_texture_side, FilterType::Triangle)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PageImage::new(rgba.into_raw(), width, height))
}

/// Simple natural sort comparison for file and entry names
pub mod natord {
    pub fn compare(a: &str, b: &str) -> std::cmp::Ordering {
        let mut a_chars = a.chars().peekable();
        let mut b_chars = b.chars().peekable();

        loop {
            match (a_chars.peek(), b_chars.peek()) {
                (None, None) => return std::cmp::Ordering::Equal,
                (None, Some(_)) => return std::cmp::Ordering::Less,
                (Some(_), None) => return std::cmp::Ordering::Greater,
                (Some(&ac), Some(&bc)) => {
                    if ac.is_ascii_digit() && bc.is_ascii_digit() {
                        // Compare whole digit runs numerically
                        let a_val = take_number(&mut a_chars);
                        let b_val = take_number(&mut b_chars);
                        match a_val.cmp(&b_val) {
                            std::cmp::Ordering::Equal => continue,
                            other => return other,
                        }
                    } else {
                        let ac_lower = ac.to_lowercase().next().unwrap_or(ac);
                        let bc_lower = bc.to_lowercase().next().unwrap_or(bc);
                        match ac_lower.cmp(&bc_lower) {
                            std::cmp::Ordering::Equal => {
                                a_chars.next();
                                b_chars.next();
                                continue;
                            }
                            other => return other,
                        }
                    }
                }
            }
        }
    }

    fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u64 {
        let mut value: u64 = 0;
        while let Some(&c) = chars.peek() {
            let Some(digit) = c.to_digit(10) else {
                break;
            };
            value = value.saturating_mul(10).saturating_add(u64::from(digit));
            chars.next();
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn natural_order_compares_digit_runs_numerically() {
        let mut names = vec!["page10.png", "page2.png", "Page1.png", "page2a.png"];
        names.sort_by(|a, b| natord::compare(a, b));
        assert_eq!(names, vec!["Page1.png", "page2.png", "page2a.png", "page10.png"]);
    }

    #[test]
    fn natural_order_keeps_separator_after_number() {
        // "1-b" vs "1-a": the dash must not be consumed by the digit run.
        assert_eq!(natord::compare("1-a", "1-b"), std::cmp::Ordering::Less);
    }

    #[test]
    fn extension_filters_are_case_insensitive() {
        assert!(is_supported_image("001.JPG"));
        assert!(is_supported_image("dir/002.webp"));
        assert!(!is_supported_image("notes.txt"));
        assert!(!is_supported_image("noext"));
        assert!(is_supported_archive(Path::new("/tmp/book.CBZ")));
        assert!(!is_supported_archive(Path::new("/tmp/book.rar")));
    }

    #[test]
    fn decode_keeps_small_pages_untouched() {
        let page = decode_page(&png_bytes(8, 4), 64).unwrap();
        assert_eq!((page.width, page.height), (8, 4));
        assert_eq!(page.memory_size(), 8 * 4 * 4);
        assert_eq!(&page.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn decode_downscales_oversized_pages() {
        let page = decode_page(&png_bytes(200, 100), 50).unwrap();
        assert_eq!((page.width, page.height), (50, 25));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_page(b"definitely not an image", 0).is_err());
    }
}
