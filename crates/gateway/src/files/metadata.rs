//! Conversion of filesystem metadata into protocol records.

use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use protocol::{DirectoryRecord, FileRecord};

const MODE_BITS: [(u32, char); 9] = [
    (0o400, 'r'),
    (0o200, 'w'),
    (0o100, 'x'),
    (0o040, 'r'),
    (0o020, 'w'),
    (0o010, 'x'),
    (0o004, 'r'),
    (0o002, 'w'),
    (0o001, 'x'),
];

/// Render a mode as an `ls -l` style string, e.g. `-rw-r--r--`.
pub fn format_mode(kind: char, mode: u32) -> String {
    let mut chars = ['-'; 10];
    chars[0] = kind;
    for (i, (bit, c)) in MODE_BITS.iter().enumerate() {
        if mode & bit != 0 {
            chars[i + 1] = *c;
        }
    }
    set_special(&mut chars[3], mode & 0o4000 != 0, 's', 'S');
    set_special(&mut chars[6], mode & 0o2000 != 0, 's', 'S');
    set_special(&mut chars[9], mode & 0o1000 != 0, 't', 'T');
    chars.iter().collect()
}

fn set_special(slot: &mut char, set: bool, with_exec: char, without_exec: char) {
    if set {
        *slot = if *slot == 'x' { with_exec } else { without_exec };
    }
}

/// Permission string for a metadata entry.
pub fn permission_string(metadata: &Metadata) -> String {
    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        'd'
    } else if file_type.is_symlink() {
        'l'
    } else if file_type.is_char_device() {
        'c'
    } else if file_type.is_block_device() {
        'b'
    } else if file_type.is_fifo() {
        'p'
    } else if file_type.is_socket() {
        's'
    } else {
        '-'
    };
    format_mode(kind, metadata.mode())
}

/// Last path component, or `/` for the filesystem root.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

/// Extension including the leading dot, empty when there is none.
pub fn file_type(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn unix_seconds(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

/// Build a file record.
pub fn file_record(name: String, path: String, metadata: &Metadata) -> FileRecord {
    FileRecord {
        file_type: file_type(&name),
        name,
        path,
        size: metadata.len(),
        created_at: unix_seconds(metadata.ctime()),
        modified_at: unix_seconds(metadata.mtime()),
        permissions: permission_string(metadata),
    }
}

/// Build a directory record with no contents loaded.
pub fn directory_record(name: String, path: String, metadata: &Metadata) -> DirectoryRecord {
    DirectoryRecord {
        name,
        path,
        size: metadata.len(),
        created_at: unix_seconds(metadata.ctime()),
        modified_at: unix_seconds(metadata.mtime()),
        permissions: permission_string(metadata),
        contents: Vec::new(),
        truncated: false,
    }
}
