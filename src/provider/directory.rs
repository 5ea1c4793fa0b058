//! Pages from image files in one directory.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use super::worker::{read_chunked, FileProvider, PageSource, WorkerSettings};
use super::{GalleryProvider, GalleryProviderListener, GallerySize, Generation};
use crate::config::Config;
use crate::error::{GalleryError, Result};
use crate::image_decode::{is_supported_image, natord};

struct DirectorySource {
    root: PathBuf,
    pages: Vec<PathBuf>,
}

impl PageSource for DirectorySource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn open(&mut self) -> Result<usize> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| GalleryError::io(&self.root, e))?;

        let mut pages: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(is_supported_image)
                    .unwrap_or(false)
            })
            .collect();

        if pages.is_empty() {
            return Err(GalleryError::EmptyGallery(self.describe()));
        }

        pages.sort_by(|a, b| {
            let a = a.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let b = b.file_name().and_then(|n| n.to_str()).unwrap_or("");
            natord::compare(a, b)
        });
        self.pages = pages;
        Ok(self.pages.len())
    }

    fn read_page(&mut self, index: usize, progress: &mut dyn FnMut(u64, u64) -> bool) -> Result<Vec<u8>> {
        let path = self.pages.get(index).ok_or(GalleryError::IndexOutOfRange {
            index,
            size: GallerySize::Ready(self.pages.len()),
        })?;
        let file = File::open(path).map_err(|e| GalleryError::io(path, e))?;
        let total = file.metadata().map(|m| m.len()).unwrap_or(0);

        read_chunked(file, total, progress)
            .map_err(|e| GalleryError::io(path, e))?
            .ok_or(GalleryError::Cancelled)
    }
}

/// Reads every supported image in a directory, in natural file-name order.
pub struct DirectoryProvider {
    inner: FileProvider<DirectorySource>,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        let source = DirectorySource {
            root: root.into(),
            pages: Vec::new(),
        };
        Self {
            inner: FileProvider::new(source, WorkerSettings::from_config(config), "gallery-directory-coordinator"),
        }
    }
}

impl GalleryProvider for DirectoryProvider {
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
