//! The working file behind one upload.
//!
//! An [`ImageFile`] is exclusively owned by one request. Pipeline stages
//! never overwrite the working file in place: each stage writes a new temp
//! file and the previous path is retired into a cleanup set, so a failing
//! stage cannot destroy the last good artifact. [`ImageFile::clean`] removes
//! the union of everything ever held.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::io::AsyncReadExt;

use crate::error::AppError;
use crate::mime::{ImageKind, SNIFF_LEN};
use crate::thumbnail::ThumbSpec;

/// One classification result attached by the labeling stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub name: String,
    pub score: f32,
}

/// The effect of one pipeline stage.
///
/// Stages run against `&ImageFile` and describe their mutations here; the
/// pipeline applies outputs between sequential stages and after a parallel
/// group joins. Parallel stages write disjoint fields (thumb outputs, OCR
/// text, labels), which keeps the group race-free by construction.
#[derive(Debug, Default)]
pub struct StageOutput {
    /// Advance the working file to a new path.
    pub path: Option<PathBuf>,
    /// The stage transcoded the image (PNG flattened to JPEG in scaling).
    pub mime: Option<ImageKind>,
    pub ocr_text: Option<String>,
    pub labels: Option<Vec<Label>>,
    /// A finished thumbnail: `(thumb name, local output path)`.
    pub thumb: Option<(String, PathBuf)>,
}

#[derive(Debug)]
pub struct ImageFile {
    original_name: String,
    path: PathBuf,
    mime: ImageKind,
    hash: Option<String>,
    thumbs: Vec<ThumbSpec>,
    ocr_text: Option<String>,
    labels: Option<Vec<Label>>,
    /// Retired working paths and stage scratch files, removed on `clean`.
    /// Interior mutability so parallel stages can register scratch files
    /// while holding a shared reference.
    retired: Mutex<Vec<PathBuf>>,
}

impl ImageFile {
    /// Open `path`, sniff the content type from its first 512 bytes and wrap
    /// it. Rejects anything outside the supported format set.
    pub async fn create(
        original_name: impl Into<String>,
        path: impl Into<PathBuf>,
        thumbs: Vec<ThumbSpec>,
    ) -> Result<ImageFile, AppError> {
        let path = path.into();

        let mut head = vec![0u8; SNIFF_LEN];
        let mut file = tokio::fs::File::open(&path).await?;
        let n = file.read(&mut head).await?;
        let mime = ImageKind::sniff(&head[..n])?;

        Ok(ImageFile {
            original_name: original_name.into(),
            path,
            mime,
            hash: None,
            thumbs,
            ocr_text: None,
            labels: None,
            retired: Mutex::new(Vec::new()),
        })
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> ImageKind {
        self.mime
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// The hash is assigned exactly once; later assignments are ignored.
    pub fn set_hash(&mut self, hash: String) {
        if self.hash.is_none() {
            self.hash = Some(hash);
        }
    }

    pub fn thumbs(&self) -> &[ThumbSpec] {
        &self.thumbs
    }

    pub fn ocr_text(&self) -> Option<&str> {
        self.ocr_text.as_deref()
    }

    pub fn labels(&self) -> Option<&[Label]> {
        self.labels.as_deref()
    }

    /// Record an intermediate file for removal on `clean`. Takes `&self` so
    /// stages inside a parallel group can retire their scratch files.
    pub fn register_scratch(&self, path: impl Into<PathBuf>) {
        let mut retired = self.retired.lock().unwrap_or_else(|e| e.into_inner());
        retired.push(path.into());
    }

    /// Move the working file to `new_path`. The previous path is retired,
    /// not deleted; `clean` removes it later.
    pub fn advance_path(&mut self, new_path: PathBuf) {
        let old = std::mem::replace(&mut self.path, new_path);
        self.register_scratch(old);
    }

    /// Apply a stage's effect.
    pub fn apply(&mut self, output: StageOutput) {
        if let Some(path) = output.path {
            self.advance_path(path);
        }
        if let Some(mime) = output.mime {
            self.mime = mime;
        }
        if let Some(text) = output.ocr_text {
            self.ocr_text = Some(text);
        }
        if let Some(labels) = output.labels {
            self.labels = Some(labels);
        }
        if let Some((name, path)) = output.thumb {
            if let Some(thumb) = self.thumbs.iter_mut().find(|t| t.name == name) {
                thumb.local_path = Some(path);
            }
        }
    }

    pub fn set_thumb_url(&mut self, name: &str, url: String) {
        if let Some(thumb) = self.thumbs.iter_mut().find(|t| t.name == name) {
            thumb.store_url = Some(url);
        }
    }

    /// Size in bytes of the current working file.
    pub async fn file_size(&self) -> Result<u64, AppError> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Width and height, decoding only the image header.
    pub fn dimensions(&self) -> Result<(u32, u32), AppError> {
        image::ImageReader::open(&self.path)
            .map_err(AppError::from)?
            .with_guessed_format()
            .map_err(AppError::from)?
            .into_dimensions()
            .map_err(|e| AppError::Internal(format!("decoding image header: {}", e)))
    }

    /// Best-effort removal of every path this upload ever touched: the
    /// current working file, all retired intermediates and each thumb's
    /// local output.
    pub async fn clean(&mut self) {
        let mut paths: Vec<PathBuf> = {
            let mut retired = self.retired.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *retired)
        };
        paths.push(self.path.clone());
        paths.extend(self.thumbs.iter().filter_map(|t| t.local_path.clone()));

        for path in paths {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove temp file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::parse_thumbs;

    // 1x1 transparent GIF
    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3B,
    ];

    async fn write_temp(tag: &str, data: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mandible-imagefile-{}-{}", std::process::id(), tag));
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    #[tokio::test]
    async fn create_sniffs_mime_and_reads_dimensions() {
        let path = write_temp("sniff", GIF_1X1).await;
        let mut image = ImageFile::create("pixel.gif", &path, Vec::new()).await.unwrap();

        assert_eq!(image.mime(), ImageKind::Gif);
        assert_eq!(image.dimensions().unwrap(), (1, 1));
        assert_eq!(image.file_size().await.unwrap(), 42);

        image.clean().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn create_rejects_unsupported_content() {
        let path = write_temp("txt", b"definitely not an image").await;
        let err = ImageFile::create("note.txt", &path, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMime));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn hash_is_assigned_once() {
        let path = write_temp("hash", GIF_1X1).await;
        let mut image = ImageFile::create("", &path, Vec::new()).await.unwrap();

        image.set_hash("abcdefg".to_string());
        image.set_hash("zzzzzzz".to_string());
        assert_eq!(image.hash(), Some("abcdefg"));

        image.clean().await;
    }

    #[tokio::test]
    async fn clean_removes_retired_paths_and_thumbs() {
        let first = write_temp("first", GIF_1X1).await;
        let second = write_temp("second", &GIF_1X1[..41]).await;
        let thumb_out = write_temp("thumb", &[0u8; 4]).await;

        let thumbs = parse_thumbs(r#"{"t": {}}"#).unwrap();
        let mut image = ImageFile::create("", &first, thumbs).await.unwrap();

        image.apply(StageOutput {
            path: Some(second.clone()),
            ..Default::default()
        });
        image.apply(StageOutput {
            thumb: Some(("t".to_string(), thumb_out.clone())),
            ..Default::default()
        });

        // advancing must not delete the old path yet
        assert!(first.exists());

        image.clean().await;
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(!thumb_out.exists());
    }

    #[tokio::test]
    async fn apply_updates_disjoint_fields() {
        let path = write_temp("apply", GIF_1X1).await;
        let mut image = ImageFile::create("", &path, Vec::new()).await.unwrap();

        image.apply(StageOutput {
            ocr_text: Some("hello world".to_string()),
            ..Default::default()
        });
        image.apply(StageOutput {
            mime: Some(ImageKind::Jpeg),
            ..Default::default()
        });

        assert_eq!(image.ocr_text(), Some("hello world"));
        assert_eq!(image.mime(), ImageKind::Jpeg);

        image.clean().await;
    }
}
