//! lensrev-domain: review data model and collaborator seams
//!
//! Defines the objects every review run passes around:
//! - `ParsedDiff`: the read-only diff under review (produced by an external parser)
//! - `ReviewIssue`: one finding reported by a lens
//! - `Severity`: the ordered severity scale (blocker > high > medium > low > nit)
//! - `ReviewError` / `ErrorCode`: the `{code, message}` error shape shared by every layer
//! - `ModelClient`: the structured-generation capability a lens calls
//!
//! ## Layer 0 - Domain
//!
//! Focus: plain data, serde shapes, and traits. No scheduling lives here.

pub mod diff;
pub mod error;
pub mod fakes;
pub mod issue;
pub mod lens_id;
pub mod model;
pub mod severity;

pub use diff::{DiffHunk, DiffStats, FileDiff, FileOperation, ParsedDiff};
pub use error::{ErrorCode, Result, ReviewError};
pub use issue::{Evidence, ReviewIssue};
pub use lens_id::LensId;
pub use model::{GenerateRequest, ModelClient, OutputShape, TraceContext};
pub use severity::Severity;

/// lensrev domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
