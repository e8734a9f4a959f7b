//! Image listing
//!
//! Lists stored images newest first, with dimensions recovered from the
//! object keys so no per-object metadata request is needed.

use super::key::ObjectKeyFormat;
use super::{ImageDimensions, UploadError};
use crate::metrics;
use crate::s3::{S3Client, S3Object};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Extensions counted as images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Default number of images per page
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// A stored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedImage {
    pub key: String,
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub dimensions: Option<ImageDimensions>,
}

/// One page of images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePage {
    pub images: Vec<ListedImage>,
    /// Key of the last image when the page is full
    pub next_cursor: Option<String>,
    pub total_count: usize,
}

/// Whether `key` ends in one of [`IMAGE_EXTENSIONS`]
pub fn is_image_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Keep image objects and sort them newest first.
/// Objects without a timestamp sort last.
pub fn sort_images(objects: Vec<S3Object>) -> Vec<S3Object> {
    let mut images: Vec<S3Object> = objects
        .into_iter()
        .filter(|object| is_image_key(&object.key))
        .collect();
    images.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    images
}

/// Cut one page out of sorted images.
///
/// The page starts right after `cursor`; a cursor that matches no key starts
/// from the beginning.
pub fn paginate(
    images: &[S3Object],
    cursor: Option<&str>,
    page_size: usize,
    key_format: &ObjectKeyFormat,
) -> ImagePage {
    let start = cursor
        .and_then(|cursor| images.iter().position(|object| object.key == cursor))
        .map(|index| index + 1)
        .unwrap_or(0);

    let page: Vec<ListedImage> = images
        .iter()
        .skip(start)
        .take(page_size)
        .map(|object| ListedImage {
            key: object.key.clone(),
            url: object.url.clone(),
            last_modified: object.last_modified,
            size: object.size,
            dimensions: key_format.parse_dimensions(&object.key),
        })
        .collect();

    let next_cursor = if page_size > 0 && page.len() == page_size {
        page.last().map(|image| image.key.clone())
    } else {
        None
    };

    ImagePage {
        images: page,
        next_cursor,
        total_count: images.len(),
    }
}

/// Lists images from the bucket
pub struct ObjectLister {
    client: Arc<S3Client>,
    key_format: ObjectKeyFormat,
    page_size: usize,
}

impl ObjectLister {
    pub fn new(client: Arc<S3Client>, page_size: usize) -> Self {
        Self {
            client,
            key_format: ObjectKeyFormat::V1,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One page of images, newest first
    #[tracing::instrument(name = "listing.images", skip(self), err)]
    pub async fn list_images(&self, cursor: Option<&str>) -> Result<ImagePage, UploadError> {
        metrics::record_listing("page");
        let images = self.sorted_images().await?;
        let page = paginate(&images, cursor, self.page_size, &self.key_format);
        tracing::debug!(
            returned = page.images.len(),
            total = page.total_count,
            "Listed images"
        );
        Ok(page)
    }

    /// Number of stored images
    #[tracing::instrument(name = "listing.count", skip(self), err)]
    pub async fn count_images(&self) -> Result<usize, UploadError> {
        metrics::record_listing("count");
        Ok(self.sorted_images().await?.len())
    }

    async fn sorted_images(&self) -> Result<Vec<S3Object>, UploadError> {
        let objects = self.client.list_all_objects(None).await.map_err(|e| {
            metrics::record_error("listing");
            UploadError::from(e)
        })?;
        Ok(sort_images(objects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn object(key: &str, minute: Option<u32>) -> S3Object {
        S3Object {
            key: key.to_string(),
            url: format!("http://localhost:9000/b/{}", key),
            last_modified: minute.map(|m| Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap()),
            size: Some(1),
        }
    }

    #[test]
    fn test_is_image_key() {
        assert!(is_image_key("uploads/a_1x1.PNG"));
        assert!(is_image_key("x.webp"));
        assert!(!is_image_key("uploads/b_0x0.bin"));
        assert!(!is_image_key("README"));
    }

    #[test]
    fn test_sort_newest_first_missing_last() {
        let sorted = sort_images(vec![
            object("old.png", Some(1)),
            object("none.png", None),
            object("new.png", Some(9)),
            object("skip.txt", Some(30)),
        ]);
        let keys: Vec<_> = sorted.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["new.png", "old.png", "none.png"]);
    }

    #[test]
    fn test_paginate_with_cursor() {
        let images: Vec<S3Object> = (0..5)
            .map(|i| object(&format!("uploads/{}_10x20.png", i), Some(50 - i)))
            .collect();
        let format = ObjectKeyFormat::V1;

        let first = paginate(&images, None, 2, &format);
        assert_eq!(first.images.len(), 2);
        assert_eq!(first.total_count, 5);
        assert_eq!(first.next_cursor.as_deref(), Some("uploads/1_10x20.png"));
        assert_eq!(
            first.images[0].dimensions,
            Some(ImageDimensions {
                width: 10,
                height: 20
            })
        );

        let last = paginate(&images, Some("uploads/3_10x20.png"), 2, &format);
        assert_eq!(last.images.len(), 1);
        assert_eq!(last.images[0].key, "uploads/4_10x20.png");
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn test_unknown_cursor_starts_at_beginning() {
        let images = vec![object("uploads/a_1x1.png", Some(1))];
        let page = paginate(&images, Some("uploads/gone.png"), 12, &ObjectKeyFormat::V1);
        assert_eq!(page.images.len(), 1);
        assert!(page.next_cursor.is_none());
    }
}
