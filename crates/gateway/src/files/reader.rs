//! Bounded, decoded file reads inside the allowed roots.

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use protocol::FileRecord;
use tracing::debug;

use super::error::FsError;
use super::metadata;
use super::resolver::{PathResolver, ResolvedPath};

/// Text encodings accepted for file reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Decode bytes, returning `None` when they are not valid in this
    /// encoding.
    pub fn decode(&self, bytes: Vec<u8>) -> Option<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes).ok(),
            TextEncoding::Ascii if bytes.is_ascii() => String::from_utf8(bytes).ok(),
            TextEncoding::Ascii => None,
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            _ => Err(FsError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reads file metadata and content through a [`PathResolver`].
#[derive(Debug, Clone)]
pub struct FileReader {
    resolver: Arc<PathResolver>,
}

impl FileReader {
    /// Create a reader over the given resolver.
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }

    /// Metadata for a regular file.
    pub fn get_file_info(&self, path: &str) -> Result<FileRecord, FsError> {
        let resolved = self.resolver.resolve(path)?;
        let metadata = fs::metadata(resolved.absolute())?;
        if !metadata.is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }

        let relative = self
            .resolver
            .to_relative_in(resolved.root_index(), resolved.absolute())?;
        Ok(metadata::file_record(
            metadata::display_name(resolved.absolute()),
            relative,
            &metadata,
        ))
    }

    /// Read and decode a file of at most `limit` bytes.
    ///
    /// The size check happens before any content is read.
    pub fn read_file_content(
        &self,
        path: &str,
        encoding: TextEncoding,
        limit: u64,
    ) -> Result<String, FsError> {
        let resolved = self.resolver.resolve(path)?;
        self.read_resolved(&resolved, path, encoding, limit)
    }

    /// Read an already resolved path. `label` names it in errors.
    ///
    /// The type check runs on metadata before the file is opened, so a FIFO
    /// or device node is rejected instead of blocking the open.
    pub fn read_resolved(
        &self,
        resolved: &ResolvedPath,
        label: &str,
        encoding: TextEncoding,
        limit: u64,
    ) -> Result<String, FsError> {
        let metadata = fs::metadata(resolved.absolute())?;
        if !metadata.is_file() {
            return Err(FsError::NotAFile(label.to_string()));
        }

        let size = metadata.len();
        if size > limit {
            return Err(FsError::TooLarge {
                path: label.to_string(),
                size,
                limit,
            });
        }

        let file = File::open(resolved.absolute())?;
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        file.take(limit).read_to_end(&mut buf)?;
        debug!(path = label, bytes = buf.len(), %encoding, "Read file");

        encoding.decode(buf).ok_or_else(|| FsError::DecodeFailure {
            path: label.to_string(),
            encoding: encoding.name().to_string(),
        })
    }

    /// Whether the path resolves to a regular file.
    pub fn file_exists(&self, path: &str) -> bool {
        self.resolver
            .resolve(path)
            .ok()
            .and_then(|resolved| fs::metadata(resolved.absolute()).ok())
            .is_some_and(|metadata| metadata.is_file())
    }
}
