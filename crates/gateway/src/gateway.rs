//! Request handling for directory listings and file reads.
//!
//! [`FileGateway`] ties the pieces together for each request:
//!
//! 1. Authenticate the bearer token through a [`SessionLookup`]
//! 2. Validate pagination and byte limits
//! 3. Audit the attempt
//! 4. Check the policy for `directory:<path>`/`list` or `file:<path>`/`read`
//!    against the lexically normalized path
//! 5. Resolve and stat on the blocking pool, then check the policy again
//!    against the resolved path when symlinks lead elsewhere
//! 6. Browse or read the resolved entry
//! 7. Audit the success, denial or error
//!
//! Unauthenticated requests and out-of-range limits are rejected before
//! anything is audited.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use protocol::{
    AuditOutcome, DirectoryListing, ErrorCode, ErrorMessage, PolicyDocument, Principal,
    ResourceKind,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::access::{AccessControl, PolicyError};
use crate::audit::{AuditSink, Auditor};
use crate::config::{Config, DEFAULT_READ_LIMIT, MAX_READ_LIMIT};
use crate::files::{
    normalize_relative, sanitize_path, DirectoryBrowser, DirectoryCache, FileReader, FsError,
    PathResolver, ResolveError, ResolvedPath, TextEncoding,
};
use crate::session::SessionLookup;

/// Action checked for directory listings.
pub const LIST_ACTION: &str = "list";

/// Action checked for file reads.
pub const READ_ACTION: &str = "read";

/// Errors surfaced to gateway clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, unknown or expired session token.
    #[error("Invalid or expired token")]
    Unauthenticated,

    /// No policy grants the request.
    #[error("Access denied for {0}")]
    Denied(String),

    /// Nothing to operate on inside the allowed directories.
    #[error("{0}")]
    NotFound(String),

    /// Malformed path or parameter.
    #[error("{0}")]
    Invalid(String),

    /// File exceeds the byte limit.
    #[error("File too large: {size} bytes, limit: {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// Content is not valid in the requested encoding.
    #[error("Unable to decode file with encoding: {0}")]
    DecodeFailure(String),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Protocol error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::Unauthenticated => ErrorCode::Unauthorized,
            GatewayError::Denied(_) => ErrorCode::AccessDenied,
            GatewayError::NotFound(_) => ErrorCode::NotFound,
            GatewayError::Invalid(_) => ErrorCode::InvalidPath,
            GatewayError::TooLarge { .. } => ErrorCode::FileTooLarge,
            GatewayError::DecodeFailure(_) => ErrorCode::DecodeFailure,
            GatewayError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying with different parameters may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::TooLarge { .. }
                | GatewayError::DecodeFailure(_)
                | GatewayError::Internal(_)
        )
    }

    /// Convert this error into a protocol ErrorMessage.
    pub fn to_error_message(&self, context: Option<String>) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            message: self.to_string(),
            context,
            recoverable: self.is_recoverable(),
        }
    }
}

impl From<FsError> for GatewayError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Invalid(msg) => GatewayError::Invalid(format!("Invalid path: {}", msg)),
            FsError::NotFound(path) => GatewayError::NotFound(format!("Path not found: {}", path)),
            FsError::NotADirectory(path) => {
                GatewayError::NotFound(format!("Directory not found: {}", path))
            }
            FsError::NotAFile(path) => GatewayError::NotFound(format!("File not found: {}", path)),
            FsError::TooLarge { size, limit, .. } => GatewayError::TooLarge { size, limit },
            FsError::DecodeFailure { encoding, .. } => GatewayError::DecodeFailure(encoding),
            FsError::UnsupportedEncoding(name) => {
                GatewayError::Invalid(format!("Unsupported encoding: {}", name))
            }
            FsError::Internal(e) => GatewayError::Internal(e.to_string()),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> GatewayError {
    GatewayError::Internal(format!("filesystem task failed: {}", e))
}

/// Pagination and read limits applied to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayLimits {
    pub default_list_limit: usize,
    pub max_list_limit: usize,
    pub default_read_limit: u64,
    pub max_read_limit: u64,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            default_list_limit: 100,
            max_list_limit: 1000,
            default_read_limit: DEFAULT_READ_LIMIT,
            max_read_limit: MAX_READ_LIMIT,
        }
    }
}

impl GatewayLimits {
    /// Limits taken from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_list_limit: config.listing.default_limit,
            max_list_limit: config.listing.max_limit,
            default_read_limit: config.read.default_limit,
            max_read_limit: config.read.max_limit,
        }
    }
}

/// Options for [`FileGateway::list_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Return the whole (bounded) tree instead of one page.
    pub recursive: bool,
    /// Page size; the configured default when `None`.
    pub limit: Option<usize>,
    /// Number of entries to skip.
    pub offset: usize,
}

/// Options for [`FileGateway::read_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Encoding name; UTF-8 when `None`.
    pub encoding: Option<String>,
    /// Byte limit; the configured default when `None`.
    pub limit: Option<u64>,
}

/// Audit context for one request.
struct RequestAudit<'a> {
    auditor: &'a Auditor,
    principal: &'a str,
    resource: &'a str,
    action: &'static str,
}

impl RequestAudit<'_> {
    fn log(&self, outcome: AuditOutcome, details: impl Into<String>) {
        self.auditor
            .log_access(self.principal, self.resource, self.action, outcome, details);
    }

    fn log_failure(&self, err: &GatewayError) {
        match err {
            GatewayError::Internal(_) => error!(
                principal = %self.principal,
                resource = %self.resource,
                error = %err,
                "Request failed"
            ),
            _ => warn!(
                principal = %self.principal,
                resource = %self.resource,
                error = %err,
                "Request rejected"
            ),
        }
        self.log(AuditOutcome::Error, err.to_string());
    }

    /// Record the terminal outcome of a request and pass it through.
    fn finish<T>(
        &self,
        outcome: Result<T, GatewayError>,
        details: impl FnOnce(&T) -> String,
    ) -> Result<T, GatewayError> {
        match &outcome {
            Ok(value) => self.log(AuditOutcome::Success, details(value)),
            Err(GatewayError::Denied(checked)) => {
                warn!(
                    principal = %self.principal,
                    resource = %self.resource,
                    checked = %checked,
                    action = self.action,
                    "Access denied"
                );
                self.log(AuditOutcome::Denied, format!("Access denied for {}", checked));
            }
            Err(err) => self.log_failure(err),
        }
        outcome
    }
}

/// A client path that resolved to an entry of the requested kind.
struct Target {
    resolved: ResolvedPath,
    /// The sanitized path as the client sent it.
    label: String,
    /// The entry's path relative to its root after symlinks are followed.
    canonical: String,
}

/// Authenticated, policy-checked, audited access to the allowed directories.
pub struct FileGateway<L: SessionLookup> {
    sessions: L,
    access: AccessControl,
    resolver: Arc<PathResolver>,
    browser: Arc<DirectoryBrowser>,
    reader: Arc<FileReader>,
    auditor: Auditor,
    limits: GatewayLimits,
}

impl<L: SessionLookup> FileGateway<L> {
    /// Assemble a gateway from its parts. The browser and reader should share
    /// `resolver`.
    pub fn new(
        sessions: L,
        access: AccessControl,
        resolver: Arc<PathResolver>,
        browser: DirectoryBrowser,
        auditor: Auditor,
    ) -> Self {
        let reader = FileReader::new(Arc::clone(&resolver));
        Self {
            sessions,
            access,
            resolver,
            browser: Arc::new(browser),
            reader: Arc::new(reader),
            auditor,
            limits: GatewayLimits::default(),
        }
    }

    /// Build a gateway from configuration.
    pub fn from_config(
        config: &Config,
        sessions: L,
        sink: Arc<dyn AuditSink>,
    ) -> anyhow::Result<Self> {
        let resolver = Arc::new(
            PathResolver::new(config.paths.allowed_directories.iter().cloned())
                .with_invalid_chars(config.paths.invalid_chars.clone()),
        );
        if resolver.roots().is_empty() {
            bail!("None of the allowed directories could be resolved");
        }

        let cache = Arc::new(DirectoryCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        ));
        let browser =
            DirectoryBrowser::new(Arc::clone(&resolver), cache).with_limits(config.tree.limits());
        let access = AccessControl::from_documents(config.policies.iter().cloned())
            .context("Failed to load access policies")?;

        Ok(Self::new(sessions, access, resolver, browser, Auditor::new(sink))
            .with_limits(GatewayLimits::from_config(config)))
    }

    /// Replace the request limits.
    pub fn with_limits(mut self, limits: GatewayLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The request limits.
    pub fn limits(&self) -> GatewayLimits {
        self.limits
    }

    /// The policy engine.
    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// The path resolver shared by browsing and reading.
    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    /// Append a policy at runtime.
    pub fn add_policy(&self, document: PolicyDocument) -> Result<(), PolicyError> {
        self.access.add_policy(document)
    }

    /// List a directory.
    ///
    /// Non-recursive listings return one fresh page of immediate children.
    /// Recursive listings return the cached, bounded tree with `has_more`
    /// always false.
    pub async fn list_directory(
        &self,
        token: &str,
        path: &str,
        options: ListOptions,
    ) -> Result<DirectoryListing, GatewayError> {
        let principal = self.authenticate(token)?;
        let limit = self.list_limit(options.limit)?;
        let path = sanitize_path(path);
        let resource = ResourceKind::Directory.resource(&path);
        let audit = RequestAudit {
            auditor: &self.auditor,
            principal: &principal.id,
            resource: &resource,
            action: LIST_ACTION,
        };

        debug!(path = %path, recursive = options.recursive, limit, offset = options.offset, "Listing directory");
        audit.log(
            AuditOutcome::Attempt,
            format!(
                "recursive={}, limit={}, offset={}",
                options.recursive, limit, options.offset
            ),
        );

        let outcome = match self
            .locate(&principal, &path, ResourceKind::Directory, LIST_ACTION)
            .await
        {
            Ok(target) => {
                self.list_target(target, options.recursive, limit, options.offset)
                    .await
            }
            Err(e) => Err(e),
        };

        audit.finish(outcome, |listing| {
            format!("Listed directory with {} items", listing.contents.len())
        })
    }

    /// Read a file as text.
    pub async fn read_file(
        &self,
        token: &str,
        path: &str,
        options: ReadOptions,
    ) -> Result<String, GatewayError> {
        let principal = self.authenticate(token)?;
        let limit = self.read_limit(options.limit)?;
        let encoding = options
            .encoding
            .unwrap_or_else(|| TextEncoding::default().name().to_string());
        let path = sanitize_path(path);
        let resource = ResourceKind::File.resource(&path);
        let audit = RequestAudit {
            auditor: &self.auditor,
            principal: &principal.id,
            resource: &resource,
            action: READ_ACTION,
        };

        debug!(path = %path, encoding = %encoding, limit, "Reading file");
        audit.log(
            AuditOutcome::Attempt,
            format!("encoding={}, limit={}", encoding, limit),
        );

        let outcome = match self
            .locate(&principal, &path, ResourceKind::File, READ_ACTION)
            .await
        {
            Ok(target) => self.read_target(target, encoding, limit).await,
            Err(e) => Err(e),
        };

        audit.finish(outcome, |content| {
            format!("Read {} characters from file", content.chars().count())
        })
    }

    fn authenticate(&self, token: &str) -> Result<Principal, GatewayError> {
        self.sessions.validate(token).ok_or_else(|| {
            warn!("Rejected request with invalid or expired token");
            GatewayError::Unauthenticated
        })
    }

    fn authorize(
        &self,
        principal: &Principal,
        resource: String,
        action: &str,
    ) -> Result<(), GatewayError> {
        if self.access.check_access(principal, &resource, action) {
            Ok(())
        } else {
            Err(GatewayError::Denied(resource))
        }
    }

    /// Resolve a client path and authorize both the name the client used and
    /// the entry it resolves to.
    ///
    /// The lexical check runs before the filesystem is touched, so a denied
    /// principal learns nothing about existence. The canonical check catches
    /// symlinks that lead to a differently named entry inside a root.
    async fn locate(
        &self,
        principal: &Principal,
        path: &str,
        kind: ResourceKind,
        action: &'static str,
    ) -> Result<Target, GatewayError> {
        self.resolver.check_syntax(path).map_err(FsError::from)?;

        let not_found = move |path: &str| {
            GatewayError::NotFound(match kind {
                ResourceKind::Directory => format!("Directory not found: {}", path),
                ResourceKind::File => format!("File not found: {}", path),
            })
        };

        let lexical = normalize_relative(path).ok_or_else(|| not_found(path))?;
        self.authorize(principal, kind.resource(&lexical), action)?;

        let resolver = Arc::clone(&self.resolver);
        let label = path.to_string();
        let target = tokio::task::spawn_blocking(move || {
            let resolved = match resolver.resolve(&label) {
                Ok(resolved) => resolved,
                Err(ResolveError::NotFound(_)) => return Err(not_found(&label)),
                Err(e) => return Err(FsError::from(e).into()),
            };

            let metadata = std::fs::metadata(resolved.absolute()).map_err(FsError::from)?;
            let matches_kind = match kind {
                ResourceKind::Directory => metadata.is_dir(),
                ResourceKind::File => metadata.is_file(),
            };
            if !matches_kind {
                return Err(not_found(&label));
            }

            let canonical = resolver
                .to_relative_in(resolved.root_index(), resolved.absolute())
                .map_err(FsError::from)?;
            Ok(Target {
                resolved,
                label,
                canonical,
            })
        })
        .await
        .map_err(join_error)??;

        if target.canonical != lexical {
            debug!(path, resolved = %target.canonical, "Path resolves to a different entry");
            self.authorize(principal, kind.resource(&target.canonical), action)?;
        }
        Ok(target)
    }

    fn list_limit(&self, requested: Option<usize>) -> Result<usize, GatewayError> {
        let limit = requested.unwrap_or(self.limits.default_list_limit);
        if limit == 0 || limit > self.limits.max_list_limit {
            return Err(GatewayError::Invalid(format!(
                "limit must be between 1 and {}, got {}",
                self.limits.max_list_limit, limit
            )));
        }
        Ok(limit)
    }

    fn read_limit(&self, requested: Option<u64>) -> Result<u64, GatewayError> {
        let limit = requested.unwrap_or(self.limits.default_read_limit);
        if limit == 0 || limit > self.limits.max_read_limit {
            return Err(GatewayError::Invalid(format!(
                "limit must be between 1 and {}, got {}",
                self.limits.max_read_limit, limit
            )));
        }
        Ok(limit)
    }

    async fn list_target(
        &self,
        target: Target,
        recursive: bool,
        limit: usize,
        offset: usize,
    ) -> Result<DirectoryListing, GatewayError> {
        let browser = Arc::clone(&self.browser);
        tokio::task::spawn_blocking(move || {
            let Target {
                resolved, label, ..
            } = target;

            if recursive {
                let mut tree = browser.get_resolved_directory_info(&resolved, &label)?;
                let contents = std::mem::take(&mut tree.contents);
                let total_count = contents.len();
                return Ok(DirectoryListing::new(&tree, contents, total_count, false));
            }

            let page = browser.list_resolved_contents(&resolved, &label, limit, offset)?;
            let has_more = page.total_count > offset.saturating_add(limit);
            Ok(DirectoryListing::new(
                &page.directory,
                page.entries,
                page.total_count,
                has_more,
            ))
        })
        .await
        .map_err(join_error)?
    }

    async fn read_target(
        &self,
        target: Target,
        encoding: String,
        limit: u64,
    ) -> Result<String, GatewayError> {
        let reader = Arc::clone(&self.reader);
        tokio::task::spawn_blocking(move || {
            let encoding: TextEncoding = encoding.parse()?;
            Ok(reader.read_resolved(&target.resolved, &target.label, encoding, limit)?)
        })
        .await
        .map_err(join_error)?
    }
}
