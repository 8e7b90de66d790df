//! PhotoStore - writes captured stills to the photos directory.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::camera::Frame;

/// Errors that can occur while saving a photo.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write photo '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A photo written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPhoto {
    pub filename: String,
    pub path: PathBuf,
}

/// Directory of captured photos.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    photos_dir: PathBuf,
}

impl PhotoStore {
    /// Create a store for `photos_dir`.
    /// Does not create the directory - call `ensure_dir_exists()` to create it.
    pub fn new(photos_dir: PathBuf) -> Self {
        Self { photos_dir }
    }

    /// Ensure the photos directory exists, creating it if necessary.
    pub fn ensure_dir_exists(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.photos_dir)
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    /// `photo_<YYYYMMDD_HHMMSS>.jpg` for the given local time.
    pub fn photo_filename(at: DateTime<Local>) -> String {
        format!("photo_{}.jpg", at.format("%Y%m%d_%H%M%S"))
    }

    /// Write `frame` under a timestamped name.
    ///
    /// A second capture within the same second replaces the first.
    pub fn save(&self, frame: &Frame) -> Result<SavedPhoto, StorageError> {
        self.save_at(frame, Local::now())
    }

    pub fn save_at(&self, frame: &Frame, at: DateTime<Local>) -> Result<SavedPhoto, StorageError> {
        let filename = Self::photo_filename(at);
        let path = self.photos_dir.join(&filename);
        std::fs::write(&path, frame.as_bytes()).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        log::info!("Saved photo {} ({} bytes)", filename, frame.len());
        Ok(SavedPhoto { filename, path })
    }
}
