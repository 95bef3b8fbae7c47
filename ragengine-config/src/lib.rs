//! ABOUTME: Layered configuration for ragengine
//! ABOUTME: Aggregates per-subsystem config with defaults -> file -> env overlay

pub mod agent;
pub mod memory;
pub mod retrieval;

pub use agent::{AgentConfig, LogFormat, LoggingConfig, RetryEnvelopeConfig};
pub use memory::{EpisodeConfig, LtmConfig, MemoryConfig, StmConfig, SuccessScoreConfig};
pub use retrieval::{ModalityWeights, RerankerConfig, RetrievalConfig, RRF_K};

use serde::{Deserialize, Serialize};

/// Top-level configuration for a ragengine deployment, covering every key in
/// the configuration table plus the ambient knobs layered on top of it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RagConfig {
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub agent: AgentConfig,
    pub retry: RetryEnvelopeConfig,
    pub logging: LoggingConfig,
}

impl RagConfig {
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::new()
    }

    /// Load configuration by layering, in increasing priority: compiled-in
    /// defaults, an optional TOML file at `path`, then environment
    /// variables prefixed `RAGENGINE_` (double-underscore separated, e.g.
    /// `RAGENGINE_AGENT__MAX_ITERATIONS=5`).
    ///
    /// # Errors
    /// Returns an error if `path` exists but is not valid TOML, or if an
    /// environment override cannot be coerced into its target field type.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())?;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RAGENGINE")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build()?;
        let config = merged.try_deserialize()?;
        Ok(config)
    }
}

/// Builder for [`RagConfig`], composing each subsystem's own builder.
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RagConfig::default(),
        }
    }

    #[must_use]
    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.config.agent = agent;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryEnvelopeConfig) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    #[must_use]
    pub fn build(self) -> RagConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_matches_spec_table() {
        let config = RagConfig::default();
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.memory.stm.ttl_seconds, 3600);
        assert_eq!(config.retrieval.reranker.fp16, true);
        assert_eq!(config.retrieval.observation_filter_threshold, 0.6);
        assert_eq!(config.memory.episode.similarity_threshold, 0.85);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.agent.query_timeout_seconds, 300);
    }

    #[test]
    fn builder_composes_subsystem_overrides() {
        let config = RagConfig::builder()
            .agent(AgentConfig::builder().max_iterations(1).build())
            .build();
        assert_eq!(config.agent.max_iterations, 1);
        // untouched subsystems keep their defaults
        assert_eq!(config.memory.stm.ttl_seconds, 3600);
    }

    #[test]
    fn load_overlays_file_on_top_of_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nmax_iterations = 2\n").unwrap();
        let config = RagConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.agent.max_iterations, 2);
        // untouched keys retain compiled-in defaults
        assert_eq!(config.memory.stm.ttl_seconds, 3600);
    }

    #[test]
    fn load_with_missing_file_returns_defaults() {
        let config = RagConfig::load(Some(std::path::Path::new("/nonexistent/path.toml")))
            .unwrap();
        assert_eq!(config.agent.max_iterations, 10);
    }
}
