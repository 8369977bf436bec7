//! The local filesystem collaborator (spec §1 "out of scope... the local
//! filesystem", §6 "Filesystem layout"). Stubbed as a thin concrete type
//! rather than a trait since the core only ever needs one storage root and
//! spec §9/§5 leave backend choice unspecified.
//!
//! Received files are written to a temp path and atomically renamed into
//! place on success, preserving "a file visible under its final name is
//! complete" (spec §5, "Shared resources").

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Storage { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn final_path(&self, name: &[u8]) -> PathBuf {
        self.root.join(sanitize_name(name))
    }

    fn temp_path(&self, name: &[u8]) -> PathBuf {
        self.root.join(format!("{}.part", sanitize_name(name)))
    }

    pub async fn exists(&self, name: &[u8]) -> bool {
        fs::metadata(self.final_path(name)).await.is_ok()
    }

    pub async fn size(&self, name: &[u8]) -> io::Result<u64> {
        Ok(fs::metadata(self.final_path(name)).await?.len())
    }

    pub async fn open_read(&self, name: &[u8]) -> io::Result<File> {
        File::open(self.final_path(name)).await
    }

    /// Opens the temp file a receive-Transfer streams into.
    pub async fn create_temp(&self, name: &[u8]) -> io::Result<File> {
        File::create(self.temp_path(name)).await
    }

    /// Atomically publishes a completed receive under its final name.
    pub async fn finalize(&self, name: &[u8]) -> io::Result<()> {
        fs::rename(self.temp_path(name), self.final_path(name)).await
    }

    /// Removes a partial file after a failed receive.
    pub async fn discard_temp(&self, name: &[u8]) {
        let _ = fs::remove_file(self.temp_path(name)).await;
    }
}

/// File names arrive as client-controlled byte strings (spec §6); names must
/// not escape the storage root via path traversal.
fn sanitize_name(name: &[u8]) -> String {
    let raw = String::from_utf8_lossy(name);
    raw.rsplit(['/', '\\']).next().unwrap_or(&raw).trim_start_matches('.').to_string()
}
