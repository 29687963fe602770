//! File organization
//!
//! Placement of classified documents is delegated to the remote
//! file-operations collaborator; the core never touches the destination
//! filesystem directly. The dispatcher interprets the collaborator's
//! responses and makes retry safe: a retry happens only after the
//! collaborator confirms the previous attempt left nothing behind.
//!
//! ## Modules
//! - `fileops` - collaborator protocol (place/exists) and HTTP client
//! - `dispatcher` - duplicate-safe placement with bounded retry

pub mod dispatcher;
pub mod fileops;

pub use dispatcher::{OrganizationDispatcher, OrganizationResult};
pub use fileops::{FileOps, FileOpsError, HttpFileOps};
