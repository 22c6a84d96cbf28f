//! Retrieval diagnostics
//!
//! Search-query/result pairs are handed off from the search path without
//! blocking and persisted later by a background drain.

mod queue;
mod store;

pub use queue::{DiagnosticsConfig, DiagnosticsQueue, DiagnosticsStats};
pub use store::{DiagnosticsStore, JsonlDiagnosticsStore, SearchDiagnostics, SearchResultRecord};
