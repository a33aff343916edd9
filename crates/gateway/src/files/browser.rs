//! Directory browsing inside the allowed roots.
//!
//! Two views are provided: a whole-tree view ([`DirectoryBrowser::get_directory_info`])
//! that is cached and bounded by [`TreeLimits`], and a paginated view of the
//! immediate children ([`DirectoryBrowser::list_directory_contents`]) that is
//! always read fresh from the filesystem.
//!
//! Every child found while walking is re-resolved through the
//! [`PathResolver`], so symlinks pointing outside the owning root are
//! dropped from results.

use std::fs::{self, DirEntry, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::{DirectoryRecord, Entry};
use tracing::debug;

use super::cache::{self, DirectoryCache};
use super::error::FsError;
use super::metadata;
use super::resolver::{PathResolver, ResolvedPath};

/// Bounds applied to recursive directory walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    /// Directories at this depth or deeper are returned without contents.
    pub max_depth: usize,
    /// Maximum number of entries produced by one walk.
    pub max_nodes: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 10_000,
        }
    }
}

/// One page of a directory's immediate children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPage {
    /// Metadata of the listed directory, without contents.
    pub directory: DirectoryRecord,
    /// The requested slice of children.
    pub entries: Vec<Entry>,
    /// Number of visible children in the directory.
    pub total_count: usize,
}

/// A child that resolved inside its parent's root.
struct Child {
    name: String,
    relative: String,
    absolute: PathBuf,
    metadata: Metadata,
}

impl Child {
    fn into_shallow_entry(self) -> Entry {
        if self.metadata.is_dir() {
            Entry::Directory(metadata::directory_record(
                self.name,
                self.relative,
                &self.metadata,
            ))
        } else {
            Entry::File(metadata::file_record(
                self.name,
                self.relative,
                &self.metadata,
            ))
        }
    }
}

/// Directory browser over the allowed roots.
pub struct DirectoryBrowser {
    resolver: Arc<PathResolver>,
    cache: Arc<DirectoryCache>,
    limits: TreeLimits,
}

impl DirectoryBrowser {
    /// Create a browser with default tree limits.
    pub fn new(resolver: Arc<PathResolver>, cache: Arc<DirectoryCache>) -> Self {
        Self {
            resolver,
            cache,
            limits: TreeLimits::default(),
        }
    }

    /// Set the bounds for recursive walks.
    pub fn with_limits(mut self, limits: TreeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The metadata cache backing [`get_directory_info`](Self::get_directory_info).
    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    /// Full metadata tree for a directory.
    ///
    /// Results are cached by resolved absolute path and may be stale for up
    /// to the cache TTL.
    pub fn get_directory_info(&self, path: &str) -> Result<DirectoryRecord, FsError> {
        let resolved = self.resolver.resolve(path)?;
        self.get_resolved_directory_info(&resolved, path)
    }

    /// [`get_directory_info`](Self::get_directory_info) for an already
    /// resolved path. `path` names it in logs and errors.
    pub fn get_resolved_directory_info(
        &self,
        resolved: &ResolvedPath,
        path: &str,
    ) -> Result<DirectoryRecord, FsError> {
        let key = cache::key_for(resolved.absolute());

        if let Some(hit) = self.cache.get(&key) {
            debug!(path, "Directory cache hit");
            return Ok(hit);
        }
        debug!(path, "Directory cache miss");

        let metadata = fs::metadata(resolved.absolute())?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        let root = resolved.root_index();
        let relative = self.resolver.to_relative_in(root, resolved.absolute())?;
        let mut budget = self.limits.max_nodes;
        let record = self.walk(
            root,
            resolved.absolute(),
            metadata::display_name(resolved.absolute()),
            relative,
            &metadata,
            0,
            &mut budget,
        )?;

        if record.truncated {
            debug!(path, max_nodes = self.limits.max_nodes, "Directory walk truncated");
        }

        self.cache.set(key, record.clone());
        Ok(record)
    }

    /// One page of a directory's immediate children.
    ///
    /// Subdirectories are returned without contents. The page is taken over
    /// the filesystem's enumeration order and never served from cache.
    pub fn list_directory_contents(
        &self,
        path: &str,
        limit: usize,
        offset: usize,
    ) -> Result<DirectoryPage, FsError> {
        let resolved = self.resolver.resolve(path)?;
        self.list_resolved_contents(&resolved, path, limit, offset)
    }

    /// [`list_directory_contents`](Self::list_directory_contents) for an
    /// already resolved path.
    pub fn list_resolved_contents(
        &self,
        resolved: &ResolvedPath,
        path: &str,
        limit: usize,
        offset: usize,
    ) -> Result<DirectoryPage, FsError> {
        let metadata = fs::metadata(resolved.absolute())?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        let root = resolved.root_index();
        let relative = self.resolver.to_relative_in(root, resolved.absolute())?;
        let directory = metadata::directory_record(
            metadata::display_name(resolved.absolute()),
            relative,
            &metadata,
        );

        let children: Vec<Child> = fs::read_dir(resolved.absolute())?
            .filter_map(Result::ok)
            .filter_map(|entry| self.confine_child(root, &entry))
            .collect();

        let total_count = children.len();
        let entries = children
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(Child::into_shallow_entry)
            .collect();

        Ok(DirectoryPage {
            directory,
            entries,
            total_count,
        })
    }

    /// Whether the path resolves to a directory.
    pub fn directory_exists(&self, path: &str) -> bool {
        self.resolver
            .resolve(path)
            .ok()
            .and_then(|resolved| fs::metadata(resolved.absolute()).ok())
            .is_some_and(|metadata| metadata.is_dir())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        root: usize,
        absolute: &Path,
        name: String,
        relative: String,
        metadata: &Metadata,
        depth: usize,
        budget: &mut usize,
    ) -> Result<DirectoryRecord, FsError> {
        let mut record = metadata::directory_record(name, relative, metadata);
        let mut entries = fs::read_dir(absolute)?;

        if depth >= self.limits.max_depth {
            record.truncated = entries.next().is_some();
            return Ok(record);
        }

        for entry in entries {
            // Skip entries we can't read
            let Ok(entry) = entry else { continue };

            if *budget == 0 {
                record.truncated = true;
                break;
            }

            let Some(child) = self.confine_child(root, &entry) else {
                continue;
            };
            *budget -= 1;

            if child.metadata.is_dir() {
                match self.walk(
                    root,
                    &child.absolute,
                    child.name,
                    child.relative,
                    &child.metadata,
                    depth + 1,
                    budget,
                ) {
                    Ok(subtree) => record.contents.push(Entry::Directory(subtree)),
                    Err(e) => {
                        debug!(path = %child.absolute.display(), error = %e, "Skipping unreadable directory");
                    }
                }
            } else {
                record.contents.push(child.into_shallow_entry());
            }
        }

        Ok(record)
    }

    /// Re-express a directory entry in the client's view and re-resolve it,
    /// dropping anything that escapes the root or cannot be stat'ed.
    fn confine_child(&self, root: usize, entry: &DirEntry) -> Option<Child> {
        let name = entry.file_name().into_string().ok()?;
        let relative = self.resolver.to_relative_in(root, &entry.path()).ok()?;
        let resolved = match self.resolver.resolve_in(root, &relative) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(path = %relative, error = %e, "Skipping directory entry");
                return None;
            }
        };
        let metadata = fs::metadata(resolved.absolute()).ok()?;

        Some(Child {
            name,
            relative,
            absolute: resolved.into_path(),
            metadata,
        })
    }
}
