//! Object key format
//!
//! Keys carry the image dimensions so listings can recover them without a
//! metadata request per object:
//!
//! ```text
//! uploads/<uuid>_<width>x<height>.<ext>
//! ```
//!
//! `0x0` means the dimensions are unknown. Builder and parser share the single
//! [`ObjectKeyFormat`] definition below; change both together or not at all.

use super::ImageDimensions;
use lazy_static::lazy_static;
use uuid::Uuid;

/// Prefix every uploaded object is stored under
pub const OBJECT_KEY_PREFIX: &str = "uploads";

/// Extension used when the file name has none
pub const FALLBACK_EXTENSION: &str = "bin";

lazy_static! {
    static ref OBJECT_KEY_PATTERN: regex_lite::Regex =
        regex_lite::Regex::new(r"(?:^|/)([0-9a-fA-F-]+)_(\d+)x(\d+)\.([a-z0-9]+)$")
            .expect("object key pattern is valid");
}

/// Versioned definition of the object key layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectKeyFormat {
    prefix: &'static str,
    fallback_extension: &'static str,
}

impl Default for ObjectKeyFormat {
    fn default() -> Self {
        Self::V1
    }
}

impl ObjectKeyFormat {
    /// `uploads/<uuid>_<w>x<h>.<ext>`
    pub const V1: ObjectKeyFormat = ObjectKeyFormat {
        prefix: OBJECT_KEY_PREFIX,
        fallback_extension: FALLBACK_EXTENSION,
    };

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Build a fresh key for `file_name`.
    ///
    /// Two calls with identical arguments never return the same key; the key
    /// is a write target, not a content hash.
    pub fn build(&self, file_name: &str, dimensions: Option<ImageDimensions>) -> String {
        self.build_with_id(Uuid::new_v4(), file_name, dimensions)
    }

    fn build_with_id(
        &self,
        id: Uuid,
        file_name: &str,
        dimensions: Option<ImageDimensions>,
    ) -> String {
        let extension = match sanitize_extension(file_name) {
            ext if ext.is_empty() => self.fallback_extension.to_string(),
            ext => ext,
        };
        let (width, height) = dimensions
            .map(|d| (d.width, d.height))
            .unwrap_or((0, 0));

        format!(
            "{}/{}_{}x{}.{}",
            self.prefix, id, width, height, extension
        )
    }

    /// Recover dimensions from a key produced by [`ObjectKeyFormat::build`].
    ///
    /// Returns `None` for keys in another shape, for numbers that do not fit a
    /// `u32`, and for the `0x0` "unknown" sentinel (or any zero side).
    pub fn parse_dimensions(&self, key: &str) -> Option<ImageDimensions> {
        let captures = OBJECT_KEY_PATTERN.captures(key)?;
        let width: u32 = captures[2].parse().ok()?;
        let height: u32 = captures[3].parse().ok()?;

        if width == 0 || height == 0 {
            return None;
        }

        Some(ImageDimensions { width, height })
    }
}

/// Lowercase alphanumeric extension of `file_name`, or an empty string.
///
/// A leading dot (`.bashrc`) does not start an extension.
pub fn sanitize_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx + 1..]
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect(),
        _ => String::new(),
    }
}

/// Build a key with the default format
pub fn build_object_key(file_name: &str, dimensions: Option<ImageDimensions>) -> String {
    ObjectKeyFormat::V1.build(file_name, dimensions)
}

/// Parse dimensions with the default format
pub fn parse_dimensions_from_key(key: &str) -> Option<ImageDimensions> {
    ObjectKeyFormat::V1.parse_dimensions(key)
}
