//! ABOUTME: Configuration for the agent graph, retry envelope, and logging
//! ABOUTME: Iteration caps, timeouts, backoff parameters, and log output shape

use serde::{Deserialize, Serialize};

/// Configuration for the ReAct/CoT agent graph (C9/C10/C11/C12) and the
/// top-level dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub query_timeout_seconds: u64,
    pub step_channel_capacity: usize,
    pub parallel_executor_cap: usize,
    pub llm_pool_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            query_timeout_seconds: 300,
            step_channel_capacity: 1,
            parallel_executor_cap: 3,
            llm_pool_size: 4,
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub const fn query_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.query_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn step_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.step_channel_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn parallel_executor_cap(mut self, cap: usize) -> Self {
        self.config.parallel_executor_cap = cap;
        self
    }

    #[must_use]
    pub const fn llm_pool_size(mut self, size: usize) -> Self {
        self.config.llm_pool_size = size;
        self
    }

    #[must_use]
    pub fn build(self) -> AgentConfig {
        self.config
    }
}

/// Retry envelope (C13) tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryEnvelopeConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for RetryEnvelopeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            factor: 2.0,
        }
    }
}

impl From<&RetryEnvelopeConfig> for ragengine_core::retry::RetryConfig {
    fn from(config: &RetryEnvelopeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: std::time::Duration::from_millis(config.base_delay_ms),
            max_delay: std::time::Duration::from_millis(config.max_delay_ms),
            factor: config.factor,
            jitter_range: (0.5, 1.5),
        }
    }
}

/// Output format for the process-wide logging subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_defaults_match_spec() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.query_timeout_seconds, 300);
        assert_eq!(config.parallel_executor_cap, 3);
    }

    #[test]
    fn retry_envelope_converts_into_core_retry_config() {
        let config = RetryEnvelopeConfig::default();
        let core: ragengine_core::retry::RetryConfig = (&config).into();
        assert_eq!(core.max_retries, 3);
        assert_eq!(core.base_delay.as_millis(), 1000);
    }
}
