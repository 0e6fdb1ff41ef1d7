//! Effective CLI configuration: defaults, then the TOML file, then
//! command-line flags and environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docqa_rag::openai::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL};
use docqa_rag::{GenerationOptions, RagConfig};
use serde::{Deserialize, Serialize};

/// Provider and storage selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// OpenAI-compatible API root. Provider default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    /// Qdrant gRPC endpoint. The local snapshot store is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_url: Option<String>,
    pub collection: String,
    /// Directory holding the local vector snapshot and the raw text.
    pub store_dir: PathBuf,
    /// Replaces the default answering instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            qdrant_url: None,
            collection: "documents".to_string(),
            store_dir: PathBuf::from(".docqa"),
            system_prompt: None,
        }
    }
}

impl ProviderSettings {
    pub fn vector_snapshot(&self) -> PathBuf {
        self.store_dir.join("vectors.json")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.store_dir.join("text")
    }
}

/// Everything the CLI needs except secrets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rag: RagConfig,
    pub generation: GenerationOptions,
    pub providers: ProviderSettings,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub chat_model: Option<String>,
    pub qdrant_url: Option<String>,
    pub collection: Option<String>,
    pub store_dir: Option<PathBuf>,
}

impl Settings {
    /// Parse a TOML settings file.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("invalid settings file")?;
        Ok(settings)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        let providers = &mut self.providers;
        if let Some(v) = overrides.base_url {
            providers.base_url = Some(v);
        }
        if let Some(v) = overrides.embedding_model {
            providers.embedding_model = v;
        }
        if let Some(v) = overrides.chat_model {
            providers.chat_model = v;
        }
        if let Some(v) = overrides.qdrant_url {
            providers.qdrant_url = Some(v);
        }
        if let Some(v) = overrides.collection {
            providers.collection = v;
        }
        if let Some(v) = overrides.store_dir {
            providers.store_dir = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        anyhow::ensure!(
            self.providers.embedding_dimensions > 0,
            "providers.embedding_dimensions must be greater than zero"
        );
        anyhow::ensure!(!self.providers.collection.trim().is_empty(), "collection must not be empty");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("cannot render settings")
    }
}
