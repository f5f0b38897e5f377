//! Descriptor source and project-root abstractions.
//!
//! A `ModelSource` hands the builder a readable descriptor plus the ability
//! to locate sibling and ancestor descriptors relative to itself. A
//! `RootLocator` finds the topmost project directory, which anchors
//! root-relative path expressions.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of a project descriptor inside its directory.
pub const DESCRIPTOR_FILE_NAME: &str = "blueprint.kdl";

/// Marker directory identifying the root of a multi-module project tree.
pub const ROOT_MARKER: &str = ".blueprint";

/// A readable project descriptor.
pub trait ModelSource: Send + Sync {
    /// Opens the descriptor content for reading.
    fn open_stream(&self) -> io::Result<Box<dyn Read>>;

    /// Human-readable location used in problem reports.
    fn location(&self) -> &str;

    /// Resolves another descriptor relative to this one. A path pointing at
    /// a directory resolves to the descriptor file inside it. Returns `None`
    /// when the source is not navigable or nothing exists at the target.
    fn resolve(&self, relative_path: &str) -> Option<Box<dyn ModelSource>>;

    /// Filesystem path of this source, when file-backed.
    fn path(&self) -> Option<&Path> {
        None
    }

    fn read_to_string(&self) -> io::Result<String> {
        let mut buf = String::new();
        self.open_stream()?.read_to_string(&mut buf)?;
        Ok(buf)
    }
}

/// A descriptor stored on disk.
#[derive(Debug, Clone)]
pub struct FileModelSource {
    path: PathBuf,
    display: String,
}

impl FileModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.display().to_string();
        Self { path, display }
    }
}

impl ModelSource for FileModelSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn location(&self) -> &str {
        &self.display
    }

    fn resolve(&self, relative_path: &str) -> Option<Box<dyn ModelSource>> {
        let base = self.path.parent()?;
        let mut candidate = base.join(relative_path);
        if candidate.is_dir() {
            candidate = candidate.join(DESCRIPTOR_FILE_NAME);
        }
        if candidate.is_file() {
            Some(Box::new(FileModelSource::new(candidate)))
        } else {
            None
        }
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// An in-memory descriptor, used for externally supplied content and tests.
/// It cannot locate siblings.
#[derive(Debug, Clone)]
pub struct StringModelSource {
    content: String,
    location: String,
}

impl StringModelSource {
    pub fn new(content: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            location: location.into(),
        }
    }
}

impl ModelSource for StringModelSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(self.content.clone().into_bytes())))
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn resolve(&self, _relative_path: &str) -> Option<Box<dyn ModelSource>> {
        None
    }
}

/// Locates the topmost directory of a project tree.
pub trait RootLocator: Send + Sync {
    /// Finds the project root at or above `start`, or `None` when no marker
    /// exists.
    fn find_root(&self, start: &Path) -> Option<PathBuf>;

    /// Like `find_root`, but failing when no root can be found. Callers use
    /// this when a root-relative expression must be resolved and guessing
    /// would corrupt downstream paths.
    fn find_mandatory_root(&self, start: &Path) -> Result<PathBuf> {
        self.find_root(start)
            .ok_or_else(|| Error::RootNotFound(start.to_path_buf()))
    }
}

/// Walks up from the starting directory until it meets a `.blueprint`
/// marker directory.
#[derive(Debug, Clone, Default)]
pub struct StandardRootLocator;

impl RootLocator for StandardRootLocator {
    fn find_root(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(ROOT_MARKER).exists())
            .map(Path::to_path_buf)
    }
}
