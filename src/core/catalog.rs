use rand::seq::SliceRandom;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::core::PlaybackError;
use crate::video::MetadataReader;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Where the playback supervisor gets its videos from.
pub trait VideoSource {
    fn select_random(&mut self) -> Result<CatalogItem, PlaybackError>;

    /// Delete `filename` from the source. Missing files are not an error.
    fn remove(&mut self, filename: &str);
}

/// Videos in one directory, rescanned whenever the directory's mtime changes.
pub struct Catalog<M: MetadataReader> {
    directory: PathBuf,
    extension: String,
    reader: M,
    items: Vec<CatalogItem>,
    last_mtime: Option<SystemTime>,
}

impl<M: MetadataReader> Catalog<M> {
    pub fn new(directory: impl Into<PathBuf>, extension: &str, reader: M) -> Self {
        let directory = directory.into();
        // The directory may not exist yet; item paths must be absolute either way
        let directory = std::fs::canonicalize(&directory)
            .or_else(|_| std::path::absolute(&directory))
            .unwrap_or(directory);
        let mut catalog = Self {
            directory,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            reader,
            items: Vec::new(),
            last_mtime: None,
        };
        catalog.refresh();
        catalog
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rescan if the directory changed since the last scan. Returns true if a
    /// rescan happened.
    pub fn refresh(&mut self) -> bool {
        let mtime = match std::fs::metadata(&self.directory).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                log::error!("Cannot stat video directory {}: {}", self.directory.display(), e);
                return false;
            }
        };

        if self.last_mtime == Some(mtime) {
            return false;
        }

        log::info!("Video directory {} changed, rescanning", self.directory.display());
        match self.scan() {
            Ok(items) => {
                log::info!("Found {} videos in {}", items.len(), self.directory.display());
                self.items = items;
                // mtime taken before the scan, so changes during it trigger another rescan
                self.last_mtime = Some(mtime);
                true
            }
            Err(e) => {
                log::error!("Failed to scan video directory {}: {}", self.directory.display(), e);
                false
            }
        }
    }

    fn scan(&self) -> std::io::Result<Vec<CatalogItem>> {
        let mut items = Vec::new();

        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() || !self.matches_extension(&path) {
                continue;
            }

            match self.reader.duration_secs(&path) {
                Ok(duration_secs) => items.push(CatalogItem { path, duration_secs }),
                Err(e) => {
                    log::error!("Failed to read metadata for {}: {}", path.display(), e);
                }
            }
        }

        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

impl<M: MetadataReader> VideoSource for Catalog<M> {
    fn select_random(&mut self) -> Result<CatalogItem, PlaybackError> {
        self.refresh();

        self.items
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| PlaybackError::EmptyCatalog { dir: self.directory.clone() })
    }

    fn remove(&mut self, filename: &str) {
        let mut components = Path::new(filename).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            log::error!("Refusing to remove {:?}: not a file name inside {}", filename, self.directory.display());
            return;
        }

        let path = self.directory.join(filename);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed video {}", path.display());
                self.last_mtime = None;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("File not found: {}", path.display());
            }
            Err(e) => {
                log::error!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
