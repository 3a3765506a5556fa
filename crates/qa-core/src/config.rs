//! Pipeline configuration
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! | variable                  | field                               |
//! |---------------------------|-------------------------------------|
//! | `QA_MODEL`                | `model.model`                       |
//! | `QA_BASE_URL`             | `model.base_url`                    |
//! | `OPENAI_API_KEY`          | `model.api_key` (never serialized)  |
//! | `QA_MAX_BULK_CONCURRENCY` | `generation.max_bulk_concurrency`   |

use crate::error::CoordinatorError;
use qa_generation::{GenerationConfig, ModelConfig};
use qa_versioning::VersioningConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Role turns per run before the run is cut off
    pub max_turns_per_run: u32,
    /// Text that ends a run when a turn's output contains it
    pub termination_token: String,
    /// Transcript lines kept in the persisted state
    pub transcript_limit: usize,
}

impl WorkflowConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the turn budget (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns_per_run = turns.max(1);
        self
    }

    /// Set the termination token
    #[inline]
    #[must_use]
    pub fn with_termination_token(mut self, token: impl Into<String>) -> Self {
        self.termination_token = token.into();
        self
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_turns_per_run: 32,
            termination_token: "TERMINATE".to_string(),
            transcript_limit: 50,
        }
    }
}

/// Where documents live on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Flat directory of uploaded blobs
    pub blob_root: PathBuf,
    /// Per-suite working directories
    pub sessions_root: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            blob_root: PathBuf::from("data/blobs"),
            sessions_root: PathBuf::from("data/sessions"),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model endpoint
    pub model: ModelConfig,
    /// Generator limits
    pub generation: GenerationConfig,
    /// Coordinator limits
    pub workflow: WorkflowConfig,
    /// Version manager
    pub versioning: VersioningConfig,
    /// Document directories
    pub documents: DocumentsConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; missing sections take their defaults
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Config`] for malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, CoordinatorError> {
        toml::from_str(text).map_err(|e| CoordinatorError::Config(e.to_string()))
    }

    /// Read a TOML file
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Config`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoordinatorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML (the API key is never included)
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Config`] if serialization fails
    pub fn to_toml_string(&self) -> Result<String, CoordinatorError> {
        toml::to_string_pretty(self).map_err(|e| CoordinatorError::Config(e.to_string()))
    }

    /// With workflow settings
    #[inline]
    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    /// With generator settings
    #[inline]
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// See [`apply_overrides`](Self::apply_overrides)
    pub fn with_env_overrides(self) -> Result<Self, CoordinatorError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Config`] if `QA_MAX_BULK_CONCURRENCY` is
    /// not a number
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoordinatorError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = lookup("QA_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = lookup("QA_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(api_key);
        }
        if let Some(raw) = lookup("QA_MAX_BULK_CONCURRENCY") {
            let n = raw.trim().parse::<usize>().map_err(|e| {
                CoordinatorError::Config(format!("QA_MAX_BULK_CONCURRENCY={raw}: {e}"))
            })?;
            self.generation.max_bulk_concurrency = n;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.generation.max_bulk_concurrency, 6);
        assert_eq!(config.generation.max_document_chars, 80_000);
        assert_eq!(config.workflow.max_turns_per_run, 32);
        assert_eq!(config.workflow.termination_token, "TERMINATE");
        assert_eq!(config.versioning.max_cut_attempts, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [model]
            model = "gpt-4.1"

            [workflow]
            max_turns_per_run = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.model.model, "gpt-4.1");
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert_eq!(config.workflow.max_turns_per_run, 8);
        assert_eq!(config.workflow.transcript_limit, 50);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = PipelineConfig::from_toml_str("[model\nmodel=").unwrap_err();
        assert!(matches!(err, CoordinatorError::Config(_)));
    }

    #[test]
    fn environment_wins() {
        let env: HashMap<&str, &str> = [
            ("QA_MODEL", "local-model"),
            ("OPENAI_API_KEY", "sk-test"),
            ("QA_MAX_BULK_CONCURRENCY", "3"),
            ("QA_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();
        let config = PipelineConfig::new()
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.model.model, "local-model");
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert_eq!(config.generation.max_bulk_concurrency, 3);

        let err = PipelineConfig::new()
            .apply_overrides(|key| (key == "QA_MAX_BULK_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Config(_)));
    }

    #[test]
    fn api_key_is_not_written_out() {
        let mut config = PipelineConfig::new();
        config.model.api_key = Some("sk-secret".into());
        let text = config.to_toml_string().unwrap();
        assert!(!text.contains("sk-secret"));
        let back = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.generation, config.generation);
    }

    #[test]
    fn reads_a_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[generation]\nmax_bulk_concurrency = 2\n\n[documents]\nblob_root = \"/srv/blobs\"").unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.generation.max_bulk_concurrency, 2);
        assert_eq!(config.documents.blob_root, PathBuf::from("/srv/blobs"));
        assert_eq!(config.documents.sessions_root, PathBuf::from("data/sessions"));

        let missing = PipelineConfig::from_file(file.path().with_extension("absent")).unwrap_err();
        assert!(matches!(missing, CoordinatorError::Config(_)));
    }
}
