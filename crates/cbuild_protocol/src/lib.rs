//! Wire types shared between the coordinator, the job store, and API callers.
//!
//! None of the HTTP transport itself lives here (routing/dispatch is an
//! external collaborator, §1) — only the JSON-serializable shapes that cross
//! that boundary and the typed error taxonomy of §7.

pub mod error;
pub mod job;
pub mod query;
pub mod request;

pub use error::{CatalogError, CoordinatorError, StoreError};
pub use job::{ArtifactView, AuditEntryView, JobStatus, JobView, WorkerView};
pub use query::{Page, JobQuery, SortField, StatusFilter};
pub use request::{BuildRequest, RequestFlag};
