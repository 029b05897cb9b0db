//! Slide files on the local filesystem.
//!
//! [`LocalFile`] serves the range reads the TIFF and MRXS parsers issue, and
//! the few in-place writes redaction needs (zeroing image data, patching a
//! directory pointer, truncating a trailing record). Writes are only issued
//! against staged copies in the destination folder.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::IoError;

use super::RangeReader;

/// Size of the zero buffer used when blanking large ranges.
const ZERO_CHUNK_SIZE: usize = 64 * 1024;

/// A local file opened for range reads, optionally writable.
pub struct LocalFile {
    file: Mutex<File>,
    path: PathBuf,
    identifier: String,
    size: AtomicU64,
    writable: bool,
}

impl LocalFile {
    /// Open a file read-only.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| IoError::from_io(path.display().to_string(), e))?;
        Self::from_file(file, path, false).await
    }

    /// Open a file for reading and in-place patching.
    pub async fn open_writable(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| IoError::from_io(path.display().to_string(), e))?;
        Self::from_file(file, path, true).await
    }

    async fn from_file(file: File, path: &Path, writable: bool) -> Result<Self, IoError> {
        let identifier = path.display().to_string();
        let metadata = file
            .metadata()
            .await
            .map_err(|e| IoError::from_io(identifier.clone(), e))?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            identifier,
            size: AtomicU64::new(metadata.len()),
            writable,
        })
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> IoError {
        IoError::from_io(self.identifier.clone(), err)
    }

    fn ensure_writable(&self) -> Result<(), IoError> {
        if self.writable {
            Ok(())
        } else {
            Err(IoError::File {
                path: self.identifier.clone(),
                message: "file was opened read-only".to_string(),
            })
        }
    }

    /// Write `data` at `offset`, extending the file if needed.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        self.ensure_writable()?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(data).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        self.size
            .fetch_max(offset + data.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Overwrite `len` bytes at `offset` with zeros.
    ///
    /// The range must lie inside the file; blanking never grows it.
    pub async fn zero_range(&self, offset: u64, len: u64) -> Result<(), IoError> {
        self.ensure_writable()?;

        let size = self.size();
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len,
                size,
            });
        }

        let zeros = vec![0u8; ZERO_CHUNK_SIZE.min(len as usize)];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_error(e))?;

        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            file.write_all(&zeros[..chunk])
                .await
                .map_err(|e| self.io_error(e))?;
            remaining -= chunk as u64;
        }
        file.flush().await.map_err(|e| self.io_error(e))?;

        Ok(())
    }

    /// Cut the file down to `len` bytes.
    pub async fn truncate(&self, len: u64) -> Result<(), IoError> {
        self.ensure_writable()?;

        let file = self.file.lock().await;
        file.set_len(len).await.map_err(|e| self.io_error(e))?;
        self.size.store(len, Ordering::SeqCst);
        Ok(())
    }

    /// Flush written data to disk.
    pub async fn sync(&self) -> Result<(), IoError> {
        let file = self.file.lock().await;
        file.sync_all().await.map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl RangeReader for LocalFile {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.size();
        if offset.checked_add(len as u64).map_or(true, |end| end > size) {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_error(e))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
