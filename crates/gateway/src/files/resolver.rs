//! Confinement of client-supplied paths to the allowed roots.
//!
//! Clients only ever see paths relative to one of the configured allowed
//! directories. The resolver maps such a relative path to a canonical,
//! existing absolute path that is guaranteed to live under one of the roots,
//! and maps absolute paths produced by directory walks back to the client's
//! relative view.
//!
//! # Security
//!
//! Every candidate is canonicalized (`.`, `..` and symlinks resolved) before
//! the containment check, so neither `..` traversal nor a symlink pointing
//! outside a root can escape. Absolute client paths are always rejected.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Characters rejected in client paths unless configured otherwise.
pub const DEFAULT_INVALID_CHARS: &str = "<>:\"|?*";

/// Errors produced while resolving a client path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The path is empty, absolute, or contains disallowed characters.
    #[error("invalid path: {0}")]
    Invalid(String),

    /// The path does not resolve to an existing entry inside any allowed root.
    #[error("path not found in any allowed directory: {0}")]
    NotFound(String),
}

/// Strip NUL bytes and other control characters from a client path.
pub fn sanitize_path(path: &str) -> String {
    path.chars().filter(|c| !is_control(*c)).collect()
}

fn is_control(c: char) -> bool {
    (c as u32) < 0x20
}

/// Collapse `.` and `..` components of a relative client path without
/// touching the filesystem.
///
/// Returns `None` when `..` climbs above the root. The empty result is `"."`.
pub fn normalize_relative(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        Some(".".to_string())
    } else {
        Some(parts.join("/"))
    }
}

/// An allowed root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedRoot {
    configured: PathBuf,
    canonical: PathBuf,
}

impl AllowedRoot {
    /// The path as it appeared in configuration.
    pub fn configured(&self) -> &Path {
        &self.configured
    }

    /// The canonicalized root all confinement checks are made against.
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }
}

/// A canonical absolute path confined to one allowed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    root_index: usize,
}

impl ResolvedPath {
    /// The canonical absolute path.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Index of the owning root in [`PathResolver::roots`].
    pub fn root_index(&self) -> usize {
        self.root_index
    }

    /// Consume into the absolute path.
    pub fn into_path(self) -> PathBuf {
        self.absolute
    }
}

/// Resolves client paths against an ordered list of allowed roots.
///
/// The resolver is immutable once built and can be shared freely between
/// threads.
#[derive(Debug, Clone)]
pub struct PathResolver {
    roots: Vec<AllowedRoot>,
    invalid_chars: String,
}

impl PathResolver {
    /// Create a resolver over the given roots, in priority order.
    ///
    /// Each root is canonicalized once. Roots that cannot be canonicalized
    /// (missing, unreadable) are skipped with a warning, so root indexes
    /// refer to the surviving roots only.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots
            .into_iter()
            .map(Into::into)
            .filter_map(|configured| match fs::canonicalize(&configured) {
                Ok(canonical) => Some(AllowedRoot {
                    configured,
                    canonical,
                }),
                Err(e) => {
                    warn!(
                        root = %configured.display(),
                        error = %e,
                        "Skipping allowed directory that cannot be resolved"
                    );
                    None
                }
            })
            .collect();

        Self {
            roots,
            invalid_chars: DEFAULT_INVALID_CHARS.to_string(),
        }
    }

    /// Replace the set of characters rejected in client paths.
    pub fn with_invalid_chars(mut self, chars: impl Into<String>) -> Self {
        self.invalid_chars = chars.into();
        self
    }

    /// The usable roots, in resolution order.
    pub fn roots(&self) -> &[AllowedRoot] {
        &self.roots
    }

    /// Check a client path for syntactic validity without touching the
    /// filesystem.
    pub fn check_syntax(&self, path: &str) -> Result<(), ResolveError> {
        if path.is_empty() {
            return Err(ResolveError::Invalid("path must not be empty".to_string()));
        }
        if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
            return Err(ResolveError::Invalid(format!(
                "absolute paths are not allowed: {}",
                path
            )));
        }
        if let Some(c) = path.chars().find(|c| self.invalid_chars.contains(*c)) {
            return Err(ResolveError::Invalid(format!(
                "path contains invalid character {:?}: {}",
                c, path
            )));
        }
        if path.chars().any(is_control) {
            return Err(ResolveError::Invalid(
                "path contains control characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a client path, trying each root in order.
    ///
    /// The first root under which the path canonicalizes to an existing,
    /// confined entry wins.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, ResolveError> {
        self.check_syntax(path)?;

        for (index, root) in self.roots.iter().enumerate() {
            if let Some(absolute) = confine(&root.canonical, path) {
                debug!(path, root = index, resolved = %absolute.display(), "Resolved path");
                return Ok(ResolvedPath {
                    absolute,
                    root_index: index,
                });
            }
        }

        debug!(path, "Path did not resolve under any allowed directory");
        Err(ResolveError::NotFound(path.to_string()))
    }

    /// Resolve a client path under one specific root.
    ///
    /// Used while walking a directory so that children stay attributed to
    /// the root their parent was resolved under.
    pub fn resolve_in(&self, root_index: usize, path: &str) -> Result<ResolvedPath, ResolveError> {
        self.check_syntax(path)?;

        let root = self
            .roots
            .get(root_index)
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))?;

        confine(&root.canonical, path)
            .map(|absolute| ResolvedPath {
                absolute,
                root_index,
            })
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))
    }

    /// Express an absolute path relative to the first root containing it.
    ///
    /// The root itself maps to `"."`.
    pub fn to_relative(&self, absolute: &Path) -> Result<String, ResolveError> {
        self.roots
            .iter()
            .find_map(|root| relative_to(&root.canonical, absolute))
            .unwrap_or_else(|| Err(outside_roots(absolute)))
    }

    /// Express an absolute path relative to a specific root.
    pub fn to_relative_in(&self, root_index: usize, absolute: &Path) -> Result<String, ResolveError> {
        self.roots
            .get(root_index)
            .and_then(|root| relative_to(&root.canonical, absolute))
            .unwrap_or_else(|| Err(outside_roots(absolute)))
    }

    /// Sanitize a client path and report whether it resolves.
    pub fn validate_path(&self, path: &str) -> bool {
        let clean = sanitize_path(path);
        match self.resolve(&clean) {
            Ok(_) => true,
            Err(e) => {
                debug!(path = %clean, error = %e, "Path validation failed");
                false
            }
        }
    }
}

/// Canonicalize `root/path` and keep it only if it exists under `root`.
fn confine(root: &Path, path: &str) -> Option<PathBuf> {
    let canonical = fs::canonicalize(root.join(path)).ok()?;
    if canonical.starts_with(root) {
        Some(canonical)
    } else {
        warn!(
            path,
            root = %root.display(),
            resolved = %canonical.display(),
            "Path escapes allowed directory"
        );
        None
    }
}

/// `None` when `absolute` is not under `root`.
fn relative_to(root: &Path, absolute: &Path) -> Option<Result<String, ResolveError>> {
    let rest = absolute.strip_prefix(root).ok()?;
    if rest.as_os_str().is_empty() {
        return Some(Ok(".".to_string()));
    }
    Some(rest.to_str().map(str::to_owned).ok_or_else(|| {
        ResolveError::Invalid(format!("path is not valid UTF-8: {}", absolute.display()))
    }))
}

fn outside_roots(absolute: &Path) -> ResolveError {
    ResolveError::Invalid(format!(
        "path is not inside any allowed directory: {}",
        absolute.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Layout:
    ///
    /// ```text
    /// base/
    ///   data/            <- allowed root
    ///     reports/q1.txt
    ///     docs/readme.md
    ///   etc/passwd       <- outside
    /// ```
    fn create_test_structure() -> (TempDir, PathBuf) {
        let base = TempDir::new().unwrap();
        let data = base.path().join("data");
        fs::create_dir_all(data.join("reports")).unwrap();
        fs::create_dir_all(data.join("docs")).unwrap();
        fs::create_dir_all(base.path().join("etc")).unwrap();

        fs::write(data.join("reports/q1.txt"), vec![b'a'; 500]).unwrap();
        fs::write(data.join("docs/readme.md"), "# docs").unwrap();
        fs::write(base.path().join("etc/passwd"), "root:x:0:0").unwrap();

        (base, data)
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_path("reports/q1.txt"), "reports/q1.txt");
        assert_eq!(sanitize_path("rep\0orts/\x01q1\n.txt"), "reports/q1.txt");
        assert_eq!(sanitize_path("\t"), "");
    }

    #[test]
    fn test_resolve_existing_file() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        let resolved = resolver.resolve("reports/q1.txt").unwrap();
        assert_eq!(resolved.root_index(), 0);
        assert_eq!(
            resolved.absolute(),
            fs::canonicalize(data.join("reports/q1.txt")).unwrap()
        );
    }

    #[test]
    fn test_resolve_dot_is_root() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        let resolved = resolver.resolve(".").unwrap();
        assert_eq!(resolved.absolute(), fs::canonicalize(&data).unwrap());
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        assert_eq!(
            resolver.resolve("reports/q2.txt"),
            Err(ResolveError::NotFound("reports/q2.txt".to_string()))
        );
    }

    #[test]
    fn test_traversal_is_not_found() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        // The target exists, but outside the root.
        assert!(matches!(
            resolver.resolve("reports/../../etc/passwd"),
            Err(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("../etc/passwd"),
            Err(ResolveError::NotFound(_))
        ));
        assert!(matches!(resolver.resolve(".."), Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_traversal_within_root_is_allowed() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        let resolved = resolver.resolve("docs/../reports/q1.txt").unwrap();
        assert_eq!(
            resolved.absolute(),
            fs::canonicalize(data.join("reports/q1.txt")).unwrap()
        );
    }

    #[test]
    fn test_absolute_paths_rejected() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        assert!(matches!(
            resolver.resolve("/etc/passwd"),
            Err(ResolveError::Invalid(_))
        ));

        // Even when the absolute path is inside the root.
        let inside = data.join("reports/q1.txt");
        assert!(matches!(
            resolver.resolve(inside.to_str().unwrap()),
            Err(ResolveError::Invalid(_))
        ));
        assert!(matches!(
            resolver.resolve("\\reports"),
            Err(ResolveError::Invalid(_))
        ));
    }

    #[test]
    fn test_empty_path_rejected() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        assert!(matches!(resolver.resolve(""), Err(ResolveError::Invalid(_))));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        for path in ["a<b", "a>b", "c:/x", "say\"hi", "a|b", "what?", "*.txt"] {
            assert!(
                matches!(resolver.resolve(path), Err(ResolveError::Invalid(_))),
                "expected {path:?} to be invalid"
            );
        }
    }

    #[test]
    fn test_custom_invalid_chars() {
        let (_base, data) = create_test_structure();
        fs::write(data.join("what?.txt"), "q").unwrap();
        let resolver = PathResolver::new([&data]).with_invalid_chars("#");

        assert!(resolver.resolve("what?.txt").is_ok());
        assert!(matches!(
            resolver.resolve("a#b"),
            Err(ResolveError::Invalid(_))
        ));
    }

    #[test]
    fn test_control_characters_rejected_by_resolve() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        assert!(matches!(
            resolver.resolve("reports\0/q1.txt"),
            Err(ResolveError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_path_sanitizes() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);

        assert!(resolver.validate_path("repo\x01rts/q1.txt"));
        assert!(resolver.validate_path("reports/q1.txt\0"));
        assert!(!resolver.validate_path("reports/../../etc/passwd"));
        assert!(!resolver.validate_path("/etc/passwd"));
        assert!(!resolver.validate_path("\0"));
    }

    #[test]
    fn test_symlink_escape_rejected() {
        let (base, data) = create_test_structure();
        symlink(base.path().join("etc"), data.join("escape")).unwrap();
        symlink(base.path().join("etc/passwd"), data.join("passwd")).unwrap();
        let resolver = PathResolver::new([&data]);

        assert!(matches!(
            resolver.resolve("escape/passwd"),
            Err(ResolveError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("passwd"),
            Err(ResolveError::NotFound(_))
        ));
        assert!(!resolver.validate_path("escape"));
    }

    #[test]
    fn test_symlink_inside_root_allowed() {
        let (_base, data) = create_test_structure();
        symlink(data.join("reports"), data.join("latest")).unwrap();
        let resolver = PathResolver::new([&data]);

        let resolved = resolver.resolve("latest/q1.txt").unwrap();
        assert_eq!(
            resolved.absolute(),
            fs::canonicalize(data.join("reports/q1.txt")).unwrap()
        );
    }

    #[test]
    fn test_first_root_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(first.path().join("shared.txt"), "first").unwrap();
        fs::write(second.path().join("shared.txt"), "second").unwrap();
        fs::write(second.path().join("only-second.txt"), "second").unwrap();

        let resolver = PathResolver::new([first.path(), second.path()]);

        let shared = resolver.resolve("shared.txt").unwrap();
        assert_eq!(shared.root_index(), 0);
        assert_eq!(fs::read_to_string(shared.absolute()).unwrap(), "first");

        let only = resolver.resolve("only-second.txt").unwrap();
        assert_eq!(only.root_index(), 1);
    }

    #[test]
    fn test_resolve_in_stays_in_root() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("only-second.txt"), "second").unwrap();
        let resolver = PathResolver::new([first.path(), second.path()]);

        assert!(matches!(
            resolver.resolve_in(0, "only-second.txt"),
            Err(ResolveError::NotFound(_))
        ));
        assert_eq!(resolver.resolve_in(1, "only-second.txt").unwrap().root_index(), 1);
        assert!(matches!(
            resolver.resolve_in(7, "only-second.txt"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_root_skipped() {
        let (base, data) = create_test_structure();
        let resolver = PathResolver::new([base.path().join("nope"), data.clone()]);

        assert_eq!(resolver.roots().len(), 1);
        assert_eq!(resolver.roots()[0].configured(), data.as_path());
        assert_eq!(resolver.resolve("reports/q1.txt").unwrap().root_index(), 0);
    }

    #[test]
    fn test_nested_roots_confinement() {
        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([data.join("reports"), data.clone()]);

        assert_eq!(resolver.resolve("q1.txt").unwrap().root_index(), 0);
        assert_eq!(resolver.resolve("docs/readme.md").unwrap().root_index(), 1);

        for path in [
            "../docs/readme.md",
            "../../etc/passwd",
            "../../../etc/passwd",
            "reports/../../../etc/passwd",
            "./../.././etc/passwd",
        ] {
            assert!(
                matches!(resolver.resolve(path), Err(ResolveError::NotFound(_))),
                "expected {path:?} to be confined"
            );
        }
    }

    #[test]
    fn test_to_relative() {
        let (base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);
        let canonical = fs::canonicalize(&data).unwrap();

        assert_eq!(resolver.to_relative(&canonical).unwrap(), ".");
        assert_eq!(
            resolver
                .to_relative(&canonical.join("reports/q1.txt"))
                .unwrap(),
            "reports/q1.txt"
        );

        let outside = fs::canonicalize(base.path().join("etc/passwd")).unwrap();
        assert!(matches!(
            resolver.to_relative(&outside),
            Err(ResolveError::Invalid(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let (_base, data) = create_test_structure();
        symlink(data.join("reports"), data.join("latest")).unwrap();
        let resolver = PathResolver::new([data.join("docs"), data.clone()]);

        for path in [
            ".",
            "reports",
            "reports/q1.txt",
            "docs/../reports/./q1.txt",
            "latest/q1.txt",
            "readme.md",
        ] {
            let resolved = resolver.resolve(path).unwrap();
            let relative = resolver.to_relative(resolved.absolute()).unwrap();
            let again = resolver.resolve(&relative).unwrap();
            assert_eq!(again.absolute(), resolved.absolute(), "round trip of {path:?}");
        }
    }

    #[test]
    fn test_to_relative_non_utf8_is_distinct_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (_base, data) = create_test_structure();
        let resolver = PathResolver::new([&data]);
        let root = resolver.roots()[0].canonical().to_path_buf();
        let odd = root.join("reports").join(OsStr::from_bytes(b"q\xff.txt"));

        let err = resolver.to_relative(&odd).unwrap_err();
        assert!(
            matches!(err, ResolveError::Invalid(ref msg) if msg.contains("not valid UTF-8")),
            "{err:?}"
        );
        assert_eq!(err, resolver.to_relative_in(0, &odd).unwrap_err());

        let outside = resolver.to_relative(Path::new("/definitely/elsewhere")).unwrap_err();
        assert!(matches!(outside, ResolveError::Invalid(ref msg) if msg.contains("not inside")));
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("reports/q1.txt").as_deref(), Some("reports/q1.txt"));
        assert_eq!(
            normalize_relative("reports/../secrets/key.pem").as_deref(),
            Some("secrets/key.pem")
        );
        assert_eq!(normalize_relative("./reports//q1.txt/").as_deref(), Some("reports/q1.txt"));
        assert_eq!(normalize_relative("reports/..").as_deref(), Some("."));
        assert_eq!(normalize_relative(".").as_deref(), Some("."));
        assert_eq!(normalize_relative(".."), None);
        assert_eq!(normalize_relative("reports/../../etc/passwd"), None);
    }
}
