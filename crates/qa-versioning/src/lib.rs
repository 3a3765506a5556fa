//! Suite versioning
//!
//! Every generation or edit produces a new immutable version of a suite's
//! artifact graph. This crate owns the version counter and history log and
//! performs clone-forward so that querying any kind at any version returns a
//! complete snapshot.
//!
//! # Core Concepts
//!
//! - [`VersionManager`]: `cut_version`, `cut_version_replacing`, `restore`
//! - [`SuiteStore`]: suite rows with a compare-and-swap version counter
//! - [`EventSink`]: best-effort audit trail (`new_version`, `ask_user`, ...)

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod audit;
mod error;
mod manager;
mod suite;
mod suite_store;

pub use audit::{AuditEvent, EventSink, InMemoryEventLog, NoopEventSink, RecordedEvent};
pub use error::VersioningFailure;
pub use manager::{RestoreOutcome, VersionCut, VersionManager, VersioningConfig};
pub use suite::{Suite, SuiteState, SuiteStatus, VersionHistoryEntry};
pub use suite_store::{InMemorySuiteStore, SuiteStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
