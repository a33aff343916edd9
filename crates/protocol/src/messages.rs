//! Metadata records and listing responses for DirGate.
//!
//! This module defines the records returned to clients by directory listing
//! and file reading. All records are serialized as JSON. Paths in records are
//! always relative to the allowed root they were resolved under; absolute
//! host paths never leave the gateway.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of resource an access decision is made about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

impl ResourceKind {
    /// Prefix used in resource strings (`file` or `directory`).
    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Directory => "directory",
        }
    }

    /// Build the resource string policies are matched against.
    pub fn resource(&self, path: &str) -> String {
        format!("{}:{}", self.prefix(), path)
    }
}

// ============================================================================
// Metadata Records
// ============================================================================

/// Metadata for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File name (last path component).
    pub name: String,
    /// Path relative to the owning allowed root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// File extension including the dot (e.g. `.txt`), empty if none.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Creation (or inode change) time, unix seconds.
    pub created_at: u64,
    /// Last modification time, unix seconds.
    pub modified_at: u64,
    /// `ls -l` style permission string.
    pub permissions: String,
}

/// Metadata for a directory, optionally with nested contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Directory name (last path component).
    pub name: String,
    /// Path relative to the owning allowed root.
    pub path: String,
    /// Size reported by the filesystem for the directory inode.
    pub size: u64,
    /// Creation (or inode change) time, unix seconds.
    pub created_at: u64,
    /// Last modification time, unix seconds.
    pub modified_at: u64,
    /// `ls -l` style permission string.
    pub permissions: String,
    /// Child entries. Empty when the children were not loaded.
    #[serde(default)]
    pub contents: Vec<Entry>,
    /// Set when the walk stopped early because of depth or node limits.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// A directory entry: either a file or a (possibly nested) directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entry {
    /// A regular file.
    File(FileRecord),
    /// A directory.
    Directory(DirectoryRecord),
}

impl Entry {
    /// Entry name.
    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Directory(d) => &d.name,
        }
    }

    /// Relative path of the entry.
    pub fn path(&self) -> &str {
        match self {
            Entry::File(f) => &f.path,
            Entry::Directory(d) => &d.path,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Entry::File(f) => f.size,
            Entry::Directory(d) => d.size,
        }
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    /// Number of entries in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        match self {
            Entry::File(_) => 1,
            Entry::Directory(d) => 1 + d.contents.iter().map(Entry::node_count).sum::<usize>(),
        }
    }
}

/// Response to a directory listing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    /// Directory name.
    pub name: String,
    /// Path relative to the owning allowed root.
    pub path: String,
    /// Size reported by the filesystem for the directory inode.
    pub size: u64,
    /// Creation (or inode change) time, unix seconds.
    pub created_at: u64,
    /// Last modification time, unix seconds.
    pub modified_at: u64,
    /// `ls -l` style permission string.
    pub permissions: String,
    /// The page of entries (or the full tree for recursive listings).
    pub contents: Vec<Entry>,
    /// Total number of immediate children in the directory.
    pub total_count: usize,
    /// Whether more entries exist past this page.
    pub has_more: bool,
}

impl DirectoryListing {
    /// Build a listing from directory metadata and a page of entries.
    pub fn new(
        directory: &DirectoryRecord,
        contents: Vec<Entry>,
        total_count: usize,
        has_more: bool,
    ) -> Self {
        Self {
            name: directory.name.clone(),
            path: directory.path.clone(),
            size: directory.size,
            created_at: directory.created_at,
            modified_at: directory.modified_at,
            permissions: directory.permissions.clone(),
            contents,
            total_count,
            has_more,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error message returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Optional context (e.g., the requested path).
    pub context: Option<String>,
    /// Whether the error is recoverable.
    pub recoverable: bool,
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, invalid or expired session token.
    Unauthorized,
    /// No policy grants the requested action.
    AccessDenied,
    /// Path does not resolve within any allowed root.
    NotFound,
    /// Malformed path or out-of-range parameter.
    InvalidPath,
    /// File exceeds the requested byte limit.
    FileTooLarge,
    /// Content is not valid under the requested encoding.
    DecodeFailure,
    /// Server-side error.
    InternalError,
}

impl ErrorCode {
    /// HTTP status code conventionally associated with this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::Unauthorized => 401,
            ErrorCode::AccessDenied => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::InvalidPath => 400,
            ErrorCode::FileTooLarge => 413,
            ErrorCode::DecodeFailure => 400,
            ErrorCode::InternalError => 500,
        }
    }
}

/// Serialize a record to a JSON string.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a record from a JSON string.
pub fn from_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}
