//! Pages from image entries of a zip/cbz archive.

use std::fs::File;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;
use zip::ZipArchive;

use super::worker::{read_chunked, FileProvider, PageSource, WorkerSettings};
use super::{GalleryProvider, GalleryProviderListener, GallerySize, Generation};
use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::{is_supported_image, natord};

struct ArchiveEntry {
    /// Position inside the zip central directory.
    zip_index: usize,
    name: String,
}

struct ArchiveSource {
    path: PathBuf,
    archive: Option<ZipArchive<Cursor<Mmap>>>,
    entries: Vec<ArchiveEntry>,
}

impl PageSource for ArchiveSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&mut self) -> Result<usize> {
        let file = File::open(&self.path).map_err(|e| GalleryError::io(&self.path, e))?;
        // SAFETY: the mapping is read-only and private to this provider. A file
        // truncated underneath us surfaces as a zip error on the affected page.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| GalleryError::io(&self.path, e))?;
        let mut archive = ZipArchive::new(Cursor::new(mmap))?;

        let mut entries = Vec::new();
        for zip_index in 0..archive.len() {
            let entry = archive.by_index(zip_index)?;
            if entry.is_file() && is_supported_image(entry.name()) {
                entries.push(ArchiveEntry {
                    zip_index,
                    name: entry.name().to_owned(),
                });
            }
        }
        if entries.is_empty() {
            return Err(GalleryError::EmptyGallery(self.describe()));
        }

        entries.sort_by(|a, b| natord::compare(&a.name, &b.name));
        debug!(archive = %self.describe(), entries = entries.len(), "archive indexed");

        self.entries = entries;
        self.archive = Some(archive);
        Ok(self.entries.len())
    }

    fn read_page(&mut self, index: usize, progress: &mut dyn FnMut(u64, u64) -> bool) -> Result<Vec<u8>> {
        let size = GallerySize::Ready(self.entries.len());
        let entry = self.entries.get(index).ok_or(GalleryError::IndexOutOfRange { index, size })?;
        let archive = self
            .archive
            .as_mut()
            .ok_or_else(|| GalleryError::Runtime("archive read before open".into()))?;

        let file = archive.by_index(entry.zip_index)?;
        let total = file.size();
        read_chunked(file, total, progress)
            .map_err(|e| GalleryError::io(&self.path, e))?
            .ok_or(GalleryError::Cancelled)
    }
}

/// Reads image entries of a zip archive, in natural entry-name order.
pub struct ArchiveProvider {
    inner: FileProvider<ArchiveSource>,
}

impl ArchiveProvider {
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        let source = ArchiveSource {
            path: path.into(),
            archive: None,
            entries: Vec::new(),
        };
        Self {
            inner: FileProvider::new(source, WorkerSettings::from_config(config), "gallery-archive-coordinator"),
        }
    }
}

impl GalleryProvider for ArchiveProvider {
    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn size(&self) -> GallerySize {
        self.inner.size()
    }

    fn error(&self) -> Option<String> {
        self.inner.error()
    }

    fn request(&self, index: usize) -> Result<Generation> {
        self.inner.request(index)
    }

    fn force_request(&self, index: usize) -> Result<Generation> {
        self.inner.force_request(index)
    }

    fn set_listener(&self, listener: Option<Arc<dyn GalleryProviderListener>>) {
        self.inner.set_listener(listener);
    }
}
