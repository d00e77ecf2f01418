//! File access seam for the applier, script replay and transactions.
//!
//! Paths are always repo-relative strings with `/` separators, exactly
//! as they appear in patch headers.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::infra::io::write_atomic;

#[derive(Debug, Error)]
pub enum ProviderError
{
    #[error("path escapes the root: {path}")]
    PathEscapesRoot
    {
        path: String,
    },

    #[error("file not found: {path}")]
    NotFound
    {
        path: String,
    },

    #[error("{path}: {source}")]
    Io
    {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: not valid UTF-8 text")]
    NotUtf8
    {
        path: String,
    },
}

/// Whole-file read/write access rooted somewhere.
pub trait FileProvider
{
    /// `Ok(None)` when the file does not exist.
    fn read(
        &self,
        path: &str,
    ) -> Result<Option<String>, ProviderError>;

    /// Create or replace the file in one step.
    fn write(
        &mut self,
        path: &str,
        content: &str,
    ) -> Result<(), ProviderError>;

    fn exists(
        &self,
        path: &str,
    ) -> bool;

    fn remove(
        &mut self,
        path: &str,
    ) -> Result<(), ProviderError>;
}

/// Files under a root directory; nothing outside it is reachable.
#[derive(Debug, Clone)]
pub struct FsProvider
{
    root: PathBuf,
}

impl FsProvider
{
    pub fn new(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Map a repo-relative path under the root, rejecting escapes.
    pub fn resolve(
        &self,
        path: &str,
    ) -> Result<PathBuf, ProviderError>
    {
        let escape = || ProviderError::PathEscapesRoot { path: path.to_string() };
        let rel = Path::new(path);
        if rel.is_absolute()
        {
            return Err(escape());
        }

        let mut out = self
            .root
            .clone();
        let mut pushed = false;
        for c in rel.components()
        {
            match c
            {
                Component::Normal(part) =>
                {
                    out.push(part);
                    pushed = true;
                }
                Component::CurDir =>
                {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }
        if !pushed
        {
            return Err(escape());
        }
        Ok(out)
    }
}

impl FileProvider for FsProvider
{
    fn read(
        &self,
        path: &str,
    ) -> Result<Option<String>, ProviderError>
    {
        let full = self.resolve(path)?;
        match std::fs::read(&full)
        {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| ProviderError::NotUtf8 { path: path.to_string() }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProviderError::Io { path: path.to_string(), source }),
        }
    }

    fn write(
        &mut self,
        path: &str,
        content: &str,
    ) -> Result<(), ProviderError>
    {
        let full = self.resolve(path)?;
        trace!(path, bytes = content.len(), "write");
        write_atomic(&full, content.as_bytes()).map_err(|source| ProviderError::Io { path: path.to_string(), source })
    }

    fn exists(
        &self,
        path: &str,
    ) -> bool
    {
        self.resolve(path)
            .is_ok_and(|p| p.is_file())
    }

    fn remove(
        &mut self,
        path: &str,
    ) -> Result<(), ProviderError>
    {
        let full = self.resolve(path)?;
        trace!(path, "remove");
        std::fs::remove_file(&full).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound
            {
                ProviderError::NotFound { path: path.to_string() }
            }
            else
            {
                ProviderError::Io { path: path.to_string(), source }
            }
        })
    }
}

/// In-memory file set, handy for previews and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryProvider
{
    files: BTreeMap<String, String>,
}

impl MemoryProvider
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_file(
        mut self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self
    {
        self.files
            .insert(path.into(), content.into());
        self
    }

    pub fn get(
        &self,
        path: &str,
    ) -> Option<&str>
    {
        self.files
            .get(path)
            .map(String::as_str)
    }

    pub fn files(&self) -> &BTreeMap<String, String>
    {
        &self.files
    }
}

impl From<BTreeMap<String, String>> for MemoryProvider
{
    fn from(files: BTreeMap<String, String>) -> Self
    {
        Self { files }
    }
}

impl FileProvider for MemoryProvider
{
    fn read(
        &self,
        path: &str,
    ) -> Result<Option<String>, ProviderError>
    {
        Ok(self
            .files
            .get(path)
            .cloned())
    }

    fn write(
        &mut self,
        path: &str,
        content: &str,
    ) -> Result<(), ProviderError>
    {
        self.files
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn exists(
        &self,
        path: &str,
    ) -> bool
    {
        self.files
            .contains_key(path)
    }

    fn remove(
        &mut self,
        path: &str,
    ) -> Result<(), ProviderError>
    {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound { path: path.to_string() })
    }
}
