//! Policy-based access decisions.
//!
//! Resources are strings of the form `file:<path>` or `directory:<path>`,
//! where `<path>` is the client's relative path. Access is default-deny: a
//! request is allowed only when some policy grants it.

pub mod engine;
pub mod policy;

pub use engine::AccessControl;
pub use policy::{CompiledPolicy, PolicyError};
