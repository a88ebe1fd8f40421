mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

use crate::prompt::PromptTemplate;
use crate::service::RetrievalSettings;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist. Values are not
    /// checked here; callers validate the sections they use once every
    /// override has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first inconsistent setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_index()?;
        self.validate_query()
    }

    /// Check the settings used to build an index.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistent `[index]` setting.
    pub fn validate_index(&self) -> anyhow::Result<()> {
        let index = &self.index;
        if index.chunk_overlap >= index.chunk_size {
            bail!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                index.chunk_overlap,
                index.chunk_size
            );
        }
        if index.group_size == 0 {
            bail!("index.group_size must be at least 1");
        }
        Ok(())
    }

    /// Check the settings used to answer queries.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistent retrieval or prompt setting.
    pub fn validate_query(&self) -> anyhow::Result<()> {
        let retrieval = &self.retrieval;
        if retrieval.num_docs_final == 0 {
            bail!("retrieval.num_docs_final must be at least 1");
        }
        if retrieval.num_docs_final > retrieval.num_retrieved_docs {
            bail!(
                "retrieval.num_docs_final ({}) cannot exceed retrieval.num_retrieved_docs ({})",
                retrieval.num_docs_final,
                retrieval.num_retrieved_docs
            );
        }

        if let Some(user) = &self.prompt.user {
            for placeholder in ["{context}", "{question}"] {
                if !user.contains(placeholder) {
                    bail!("prompt.user must contain {placeholder}");
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate::with_overrides(
            self.prompt.preset,
            self.prompt.system.as_deref(),
            self.prompt.user.as_deref(),
        )
    }

    #[must_use]
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            num_retrieved_docs: self.retrieval.num_retrieved_docs,
            num_docs_final: self.retrieval.num_docs_final,
        }
    }
}
