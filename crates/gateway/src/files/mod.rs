//! Confined filesystem access for directory browsing and file reads.
//!
//! This module provides:
//! - Path resolution against an ordered list of allowed roots
//! - A sliding-TTL LRU cache for directory metadata
//! - Bounded recursive directory walks and paginated listings
//! - Size-limited, decoded file reads
//!
//! # Security
//!
//! All client paths are relative to an allowed root. They are canonicalized
//! before the containment check, so `..` traversal and symlinks pointing
//! outside a root are rejected. Children found while walking a directory are
//! re-resolved the same way.

pub mod browser;
pub mod cache;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod resolver;

pub use browser::{DirectoryBrowser, DirectoryPage, TreeLimits};
pub use cache::{DirectoryCache, MetadataCache};
pub use error::FsError;
pub use reader::{FileReader, TextEncoding};
pub use resolver::{
    normalize_relative, sanitize_path, AllowedRoot, PathResolver, ResolveError, ResolvedPath,
    DEFAULT_INVALID_CHARS,
};
