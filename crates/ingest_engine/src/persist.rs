use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory {path:?} missing or not writable: {message}")]
    OutputDir { path: PathBuf, message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    let fail = |message: String| PersistError::OutputDir {
        path: dir.to_path_buf(),
        message,
    };
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| fail(e.to_string()))?;
        if !meta.is_dir() {
            return Err(fail("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
    }
    // Writability check; the temp file is removed on drop.
    NamedTempFile::new_in(dir).map_err(|e| fail(e.to_string()))?;
    Ok(())
}

/// Writes files under a root directory by writing a temp file next to the
/// target and renaming it, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    root: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` to `root/relative`, creating parent directories.
    pub fn write(&self, relative: &Path, content: &[u8]) -> Result<PathBuf, PersistError> {
        let mut pending = self.start(relative)?;
        pending.append(content)?;
        pending.commit()
    }

    /// Opens a temp file for `root/relative` to be filled incrementally.
    /// Nothing appears at the target until [`PendingFile::commit`]; dropping
    /// the pending file removes it.
    pub fn start(&self, relative: &Path) -> Result<PendingFile, PersistError> {
        let target = self.root.join(relative);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        ensure_output_dir(&parent)?;
        let tmp = NamedTempFile::new_in(&parent)?;
        Ok(PendingFile {
            target,
            out: BufWriter::new(tmp),
            written: 0,
        })
    }
}

/// A file being written in pieces under its final name's directory.
#[derive(Debug)]
pub struct PendingFile {
    target: PathBuf,
    out: BufWriter<NamedTempFile>,
    written: u64,
}

impl PendingFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn append(&mut self, content: &[u8]) -> Result<(), PersistError> {
        self.out.write_all(content)?;
        self.written += content.len() as u64;
        Ok(())
    }

    /// Flushes, syncs and renames the temp file onto the target.
    pub fn commit(self) -> Result<PathBuf, PersistError> {
        let mut tmp = self.out.into_inner().map_err(|e| PersistError::Io(e.into_error()))?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // `persist` overwrites on Unix but not on Windows.
        if self.target.exists() {
            fs::remove_file(&self.target)?;
        }
        tmp.persist(&self.target).map_err(|e| PersistError::Io(e.error))?;
        Ok(self.target)
    }
}
