//! Whole-document storage primitive.
//!
//! Every durable map the bridge keeps (watermarks, publication records,
//! profile-broadcast log) is a single small JSON document that is read fully
//! and rewritten fully on every mutation. Partial updates are deliberately
//! not supported; read-all/write-all is the semantics the dedup guarantees
//! rest on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;

pub trait Document: Send + Sync {
    /// Full contents, or None when the document has never been written.
    fn read(&self) -> Result<Option<String>>;
    /// Atomically replace the full contents.
    fn write(&self, contents: &str) -> Result<()>;
}

impl<D: Document + ?Sized> Document for Arc<D> {
    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<()> {
        (**self).write(contents)
    }
}

/// File-backed document. Writes go to a sibling temp file first and are
/// renamed into place, so readers never observe a torn document.
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Document for FileDocument {
    fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory document for tests.
#[derive(Default)]
pub struct MemoryDocument {
    contents: Mutex<Option<String>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded document, for exercising load paths.
    pub fn with_contents(contents: &str) -> Self {
        Self {
            contents: Mutex::new(Some(contents.to_string())),
        }
    }
}

impl Document for MemoryDocument {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents.lock().unwrap().clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        *self.contents.lock().unwrap() = Some(contents.to_string());
        Ok(())
    }
}
