//! Game bundle discovery and path resolution for the arcade.
//!
//! A bundle is any directory directly under the games root. Listings are read
//! from disk on every call so new bundles show up without a restart.
//!
//! Every resolved path is canonicalised and must stay inside both the games
//! root and its bundle directory; `..` segments, absolute paths and escaping
//! symlinks all resolve to `NotFound`.

use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

pub const BUNDLE_INDEX: &str = "index.html";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Not found")]
    NotFound,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct GameLibrary {
    root: PathBuf,
}

impl GameLibrary {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the bundle directories, sorted.
    ///
    /// # Errors
    /// Returns an error if the games root cannot be read.
    pub async fn list_bundles(&self) -> io::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut bundles = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => bundles.push(name),
                Err(name) => debug!("Skipping bundle with non UTF-8 name: {name:?}"),
            }
        }

        bundles.sort();
        Ok(bundles)
    }

    /// Path of the bundle's `index.html`.
    ///
    /// # Errors
    /// Returns `NotFound` when the bundle or its index is missing.
    pub async fn resolve_page(&self, bundle: &str) -> Result<PathBuf, ResolveError> {
        self.resolve_asset(bundle, BUNDLE_INDEX).await
    }

    /// Path of `relative` inside the bundle.
    ///
    /// # Errors
    /// Returns `NotFound` when the entry is missing, is not a regular file, or
    /// would escape the bundle directory.
    pub async fn resolve_asset(
        &self,
        bundle: &str,
        relative: &str,
    ) -> Result<PathBuf, ResolveError> {
        if !is_plain_segment(bundle) || !is_relative_path(relative) {
            return Err(ResolveError::NotFound);
        }

        let root = canonical(&self.root).await?;
        let bundle_dir = canonical(&root.join(bundle)).await?;
        if bundle_dir.parent() != Some(root.as_path()) || !fs::metadata(&bundle_dir).await?.is_dir()
        {
            return Err(ResolveError::NotFound);
        }

        let target = canonical(&bundle_dir.join(relative)).await?;
        if !target.starts_with(&bundle_dir) {
            debug!("Rejected path escaping bundle {bundle}: {relative}");
            return Err(ResolveError::NotFound);
        }

        if fs::metadata(&target).await?.is_file() {
            Ok(target)
        } else {
            Err(ResolveError::NotFound)
        }
    }
}

// Missing entries and paths through a regular file both fail to canonicalise.
async fn canonical(path: &Path) -> Result<PathBuf, ResolveError> {
    fs::canonicalize(path).await.map_err(|err| {
        if err.kind() != ErrorKind::NotFound {
            debug!("Failed to canonicalize {}: {err}", path.display());
        }
        ResolveError::NotFound
    })
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_relative_path(relative: &str) -> bool {
    !relative.is_empty()
        && Path::new(relative)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
