//! QA artifact generation
//!
//! Prompt-driven generators that turn documents and prior-version artifacts
//! into new versions of a suite's artifact graph.
//!
//! # Core Operations
//!
//! - **Extract**: documents → requirements ([`RequirementExtractor`])
//! - **Design**: requirements → test design flows ([`TestDesignGenerator`])
//! - **Viewpoints**: requirements + flows → viewpoints ([`ViewpointGenerator`])
//! - **Write**: requirement + flows + viewpoints → test cases
//!   ([`TestCaseGenerator`], single or bulk)
//! - **Edit**: instruction + snapshot → rewritten test cases ([`TestCaseEditor`])
//!
//! # Architecture
//!
//! ```text
//! load context (v) → TextGenerator → parse + normalize → cut v+1 → persist (v+1)
//!                                         ↑
//!                              invalid output stops here
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_generation::prelude::*;
//!
//! let env = GenerationEnv::new(client, documents, versions);
//! let produced = RequirementExtractor::new(env.clone()).produce(&suite, ()).await?;
//! let batch = TestCaseGenerator::new(env).generate_all(&suite).await?;
//! assert_eq!(batch.version, produced.version + 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod client;
pub mod design;
pub mod documents;
pub mod edit;
pub mod env;
pub mod error;
pub mod generator;
pub mod insight;
pub mod normalize;
pub mod parse;
pub mod prompts;
pub mod requirements;
pub mod testcases;
pub mod viewpoints;

pub use cache::{RequirementRecord, RequirementsCache, DEFAULT_CACHED_SUITES};
pub use client::{ModelConfig, OpenAiClient, TextGenerator};
pub use design::{normalize_testing_type, TestDesignGenerator};
pub use documents::{DirectoryDocumentSource, Document, DocumentSource, FetchReport, InMemoryDocumentSource};
pub use edit::{EditReport, EditedRequirement, TestCaseEditor};
pub use env::{GenerationConfig, GenerationEnv, MAX_BULK_CONCURRENCY};
pub use error::{ClientError, ErrorKind, GenerationError};
pub use generator::{ArtifactGenerator, Produced};
pub use insight::{Answer, GapReport, InsightTools, PreviewMode};
pub use requirements::RequirementExtractor;
pub use testcases::{BatchFailure, BatchItem, BatchReport, TestCaseGenerator};
pub use viewpoints::{ViewpointGenerator, ViewpointItem};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving generators
    pub use crate::env::{GenerationConfig, GenerationEnv};
    pub use crate::error::{ErrorKind, GenerationError};
    pub use crate::generator::ArtifactGenerator;
    pub use crate::{
        InsightTools, RequirementExtractor, TestCaseEditor, TestCaseGenerator, TestDesignGenerator,
        ViewpointGenerator,
    };
    pub use qa_artifact::SuiteId;
}
