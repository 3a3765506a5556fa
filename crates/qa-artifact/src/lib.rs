//! QA artifact rows
//!
//! Versioned, suite-scoped rows for the four QA artifact kinds, with an open
//! JSON content model.
//!
//! # Core Concepts
//!
//! - [`ArtifactKind`]: the four tables (requirements, test designs,
//!   viewpoints, test cases)
//! - [`ArtifactKey`]: identifying columns and lineage links of a row; its
//!   [`NaturalKey`] decides which rows compete for the single `active` slot
//! - [`ContentDoc`]: ordered JSON object with a merge that preserves unknown
//!   fields
//! - [`ArtifactStore`]: insert / query / deactivate row store contract
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_artifact::{ArtifactKey, ArtifactKind, ArtifactStore, ContentDoc, NewArtifact};
//!
//! let store = InMemoryArtifactStore::new();
//! let row = NewArtifact::new(suite, 1, ArtifactKey::requirement("REQ-1"), content);
//! store.insert(ArtifactKind::Requirement, row).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod content;
mod error;
mod hash;
mod ids;
mod kind;
mod memory;
mod row;
mod store;

pub use content::ContentDoc;
pub use error::{PersistenceFailure, StoreError, StoreResult};
pub use hash::ContentFingerprint;
pub use ids::{RowId, SuiteId};
pub use kind::{ArtifactKey, ArtifactKind, NaturalKey};
pub use memory::InMemoryArtifactStore;
pub use row::{ArtifactRow, NewArtifact, RowFilter};
pub use store::{latest_per_key, ArtifactStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
