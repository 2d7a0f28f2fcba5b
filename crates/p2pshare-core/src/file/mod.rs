//! File operations for p2pshare.
//!
//! - Validating the file offered for sending
//! - Choosing where a received file lands ([`DestinationPolicy`])
//! - Writing received bytes to disk ([`FileWriter`])

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::protocol::TransferHeader;

/// Attempts made to create a destination file before giving up.
const MAX_CREATE_ATTEMPTS: u32 = 16;

/// Decides the on-disk path for an incoming file.
///
/// Called once per incoming transfer, and again if the chosen path
/// turned out to exist by the time the receiver created it.
pub trait DestinationPolicy: Send + Sync {
    /// Path the received file should be written to.
    fn destination(&self, header: &TransferHeader, peer: SocketAddr) -> Result<PathBuf>;
}

/// Writes into a directory, never overwriting.
///
/// `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, … when taken.
#[derive(Debug, Clone)]
pub struct UniqueNamePolicy {
    dir: PathBuf,
}

impl UniqueNamePolicy {
    /// Create a policy writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DestinationPolicy for UniqueNamePolicy {
    fn destination(&self, header: &TransferHeader, _peer: SocketAddr) -> Result<PathBuf> {
        let name = sanitize_file_name(&header.file_name)
            .ok_or_else(|| Error::InvalidPath(header.file_name.clone()))?;

        let first = self.dir.join(&name);
        if !first.exists() {
            return Ok(first);
        }

        let (stem, ext) = split_extension(&name);
        (1..=u32::MAX)
            .map(|n| self.dir.join(format!("{stem} ({n}){ext}")))
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| Error::InvalidPath(format!("no free name for '{name}'")))
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Reduce an offered file name to a single safe path component.
///
/// Directory parts (either separator) are stripped. Returns `None` for
/// names that are empty or only `.`/`..` after stripping.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Check that `path` names a regular file and return its size.
///
/// # Errors
///
/// - [`Error::FileNotFound`] if nothing exists at `path`
/// - [`Error::InvalidPath`] if `path` is a directory or other non-file
pub fn regular_file_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;

    if !metadata.is_file() {
        return Err(Error::InvalidPath(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    Ok(metadata.len())
}

/// Display name of a file for the transfer header.
pub fn offered_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Sink for a received file.
#[derive(Debug)]
pub struct FileWriter {
    /// Output file path
    pub output_path: PathBuf,
    /// Size announced by the sender
    pub expected_size: Option<u64>,
    /// Bytes written so far
    pub bytes_written: u64,
    file: tokio::fs::File,
}

impl FileWriter {
    /// Create the destination chosen by `policy`.
    ///
    /// The file is opened with `create_new`; when another writer grabbed
    /// the name first, the policy is asked again.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy fails or no free name is found.
    pub async fn create(
        policy: &dyn DestinationPolicy,
        header: &TransferHeader,
        peer: SocketAddr,
    ) -> Result<Self> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let output_path = policy.destination(header, peer)?;
            if let Some(parent) = output_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&output_path)
                .await
            {
                Ok(file) => {
                    return Ok(Self {
                        output_path,
                        expected_size: header.size,
                        bytes_written: 0,
                        file,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!("{} appeared concurrently, retrying", output_path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::InvalidPath(format!(
            "no free destination name for '{}'",
            header.file_name
        )))
    }

    /// Append a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Stop writing and keep what arrived so far on disk.
    pub async fn abandon(mut self) {
        if let Err(e) = self.file.flush().await {
            tracing::warn!("Failed to flush partial file {}: {}", self.output_path.display(), e);
        }
        tracing::info!(
            "Kept partial file {} ({} bytes)",
            self.output_path.display(),
            self.bytes_written
        );
    }

    /// Flush and sync to disk, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the sender announced a different
    /// size, or an I/O error if syncing fails.
    pub async fn finalize(mut self) -> Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        match self.expected_size {
            Some(expected) if expected != self.bytes_written => Err(Error::SizeMismatch {
                expected,
                received: self.bytes_written,
            }),
            _ => Ok(self.bytes_written),
        }
    }
}
