//! # dirgate Gateway Library
//!
//! Confined, policy-checked, audited file browsing for remote clients.
//!
//! ## Overview
//!
//! The gateway exposes a set of allowed directories to authenticated
//! principals. It provides:
//!
//! - **Path Confinement**: Client paths are resolved against the allowed
//!   roots and can never escape them, through `..` or symlinks
//! - **Access Control**: Ordered glob policies with attribute conditions,
//!   default-deny
//! - **Directory Browsing**: Paginated listings and bounded recursive trees
//!   with an LRU/TTL metadata cache
//! - **File Reading**: Size-limited text reads in UTF-8, ASCII or Latin-1
//! - **Auditing**: Every request is recorded as attempt, then success,
//!   denied or error
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         FileGateway                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │   Session    │  │    Access    │  │       Auditor        │  │
//! │  │    Store     │  │   Control    │  │   (tracing / file)   │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘  │
//! │                                                                  │
//! │  ┌───────────────────┐  ┌───────────────────────────────────┐  │
//! │  │ DirectoryBrowser  │  │           FileReader              │  │
//! │  │  + MetadataCache  │  │                                   │  │
//! │  └───────────────────┘  └───────────────────────────────────┘  │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                      PathResolver                          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gateway::{Config, FileGateway, ListOptions, SessionStore, TracingAuditSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let sessions =
//!         Arc::new(SessionStore::new().with_default_duration(config.session.duration()));
//!     let gateway = FileGateway::from_config(
//!         &config,
//!         Arc::clone(&sessions),
//!         Arc::new(TracingAuditSink),
//!     )?;
//!
//!     let token = sessions.issue_session("alice", vec![]);
//!     let listing = gateway
//!         .list_directory(&token, ".", ListOptions::default())
//!         .await?;
//!     println!("{} entries", listing.total_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path confinement, browsing, reading and caching
//! - [`access`]: Policy compilation and evaluation
//! - [`session`]: Token-based sessions
//! - [`audit`]: Audit sinks
//! - [`gateway`]: Request orchestration

pub mod access;
pub mod audit;
pub mod config;
pub mod files;
pub mod gateway;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export access types for convenience
pub use access::{AccessControl, CompiledPolicy, PolicyError};

// Re-export audit types for convenience
pub use audit::{AuditSink, Auditor, FileAuditSink, MemoryAuditSink, TracingAuditSink};

// Re-export files types for convenience
pub use files::{
    DirectoryBrowser, DirectoryCache, DirectoryPage, FileReader, FsError, PathResolver,
    ResolveError, TextEncoding, TreeLimits,
};

// Re-export session types for convenience
pub use session::{SessionLookup, SessionStore};

// Re-export gateway types for convenience
pub use gateway::{FileGateway, GatewayError, GatewayLimits, ListOptions, ReadOptions};
