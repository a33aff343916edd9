//! # DirGate Protocol Library
//!
//! This crate provides the wire records exchanged between the DirGate gateway
//! and its clients (typically LLM tool runners).
//!
//! ## Overview
//!
//! - **Metadata Records**: [`FileRecord`], [`DirectoryRecord`] and the tagged
//!   [`Entry`] union used for nested directory trees
//! - **Listings**: [`DirectoryListing`] pages with `total_count`/`has_more`
//! - **Principals**: the authenticated identity ([`Principal`]) produced by a
//!   session lookup
//! - **Policies**: serializable [`PolicyDocument`]s loaded from configuration
//! - **Audit Events**: [`AuditRecord`] with an [`AuditOutcome`]
//! - **Errors**: client-facing [`ErrorCode`]/[`ErrorMessage`] and the
//!   crate-local [`ProtocolError`]
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Entry, FileRecord, ResourceKind};
//!
//! let resource = ResourceKind::File.resource("reports/q1.txt");
//! assert_eq!(resource, "file:reports/q1.txt");
//!
//! let entry = Entry::File(FileRecord {
//!     name: "q1.txt".to_string(),
//!     path: "reports/q1.txt".to_string(),
//!     size: 500,
//!     file_type: ".txt".to_string(),
//!     created_at: 0,
//!     modified_at: 0,
//!     permissions: "-rw-r--r--".to_string(),
//! });
//! let json = protocol::to_json(&entry).unwrap();
//! assert!(json.contains("\"kind\":\"file\""));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: metadata records, listings and error codes
//! - [`principal`]: authenticated principal
//! - [`policy`]: access policy documents
//! - [`audit`]: audit trail records
//! - [`error`]: error types

pub mod audit;
pub mod error;
pub mod messages;
pub mod policy;
pub mod principal;

pub use audit::{AuditOutcome, AuditRecord};
pub use error::{ProtocolError, Result};
pub use messages::{
    from_json, to_json, DirectoryListing, DirectoryRecord, Entry, ErrorCode, ErrorMessage,
    FileRecord, ResourceKind,
};
pub use policy::PolicyDocument;
pub use principal::Principal;
