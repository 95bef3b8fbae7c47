//! ABOUTME: Top-level entrypoint tying classifier, speculative path,
//! ABOUTME: agent graph, Step stream, and quality monitoring together

pub mod classifier;
pub mod graph;
pub mod quality;
pub mod speculative;
pub mod stream;

pub use classifier::{classify, should_take_fast_path};
pub use graph::AgentGraph;
pub use quality::{QualityMonitor, QualityReport, SearchQualityRecord};
pub use speculative::{SpeculativeOutcome, SpeculativePath};
pub use stream::{step_stream, CancellationFlag, StepEmitter};

use ragengine_config::AgentConfig;
use ragengine_core::error::{RagError, Result};
use ragengine_core::traits::Llm;
use ragengine_core::types::{AgentState, Query, SpeculativeResult, Step, StepKind};
use ragengine_memory::MemoryManager;
use ragengine_retrieval::{HybridRetriever, ObservationProcessor};
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use uuid::Uuid;

/// How far back the quality monitor's rolling window reaches, matching the
/// default window used when nothing else is specified.
const QUALITY_RETENTION_MINUTES: i64 = 60;

/// The full retrieval-augmented agent: classifies each query, dispatches it
/// to the speculative path or the full agent graph, and reports every Step
/// on a backpressured stream. Grounded on `RAGAgent.process_query`'s
/// episodic-reuse-check -> complexity-classify -> dispatch -> error-step
/// flow.
pub struct RagAgent {
    speculative: SpeculativePath,
    graph: AgentGraph,
    memory: Arc<MemoryManager>,
    quality: parking_lot::Mutex<QualityMonitor>,
    config: AgentConfig,
}

impl RagAgent {
    #[must_use]
    pub fn new(
        retriever: Arc<HybridRetriever>,
        observation: Arc<ObservationProcessor>,
        llm: Arc<dyn Llm>,
        memory: Arc<MemoryManager>,
        config: AgentConfig,
        retry: ragengine_config::RetryEnvelopeConfig,
    ) -> Self {
        let speculative = SpeculativePath::new(
            Arc::clone(&retriever),
            Arc::clone(&observation),
            Arc::clone(&llm),
            Arc::clone(&memory),
            config.clone(),
        );
        let graph = AgentGraph::new(
            retriever,
            observation,
            llm,
            Arc::clone(&memory),
            config.clone(),
            (&retry).into(),
        );
        Self {
            speculative,
            graph,
            memory,
            quality: parking_lot::Mutex::new(QualityMonitor::new(QUALITY_RETENTION_MINUTES)),
            config,
        }
    }

    #[must_use]
    pub fn quality_report(&self, search_mode: Option<&str>) -> QualityReport {
        self.quality.lock().quality_report(search_mode)
    }

    #[must_use]
    pub fn low_quality_queries(&self, limit: usize) -> Vec<SearchQualityRecord> {
        self.quality.lock().low_quality_queries(limit)
    }

    /// Start processing `query`, returning a Step stream and a
    /// `CancellationFlag` the caller can use to stop the run early.
    ///
    /// # Errors
    /// Returns `RagError::InvalidInput` without spawning any work if `query`
    /// fails validation (empty text or out-of-range `top_k`).
    pub fn process_query(
        self: Arc<Self>,
        query: Query,
    ) -> Result<(impl Stream<Item = Step>, CancellationFlag)> {
        query.validate()?;

        let session_id = if query.session_id.trim().is_empty() {
            format!("session_{}", &Uuid::new_v4().simple().to_string()[..8])
        } else {
            query.session_id.clone()
        };

        let (emitter, stream) = step_stream(self.config.step_channel_capacity);
        let cancellation = CancellationFlag::new();
        let task_cancellation = cancellation.clone();

        let _handle = tokio::spawn(async move {
            self.run_query(query.text, session_id, query.top_k, query.speculative_hint, emitter, task_cancellation)
                .await;
        });

        Ok((stream, cancellation))
    }

    async fn run_query(
        &self,
        query_text: String,
        session_id: String,
        top_k: usize,
        speculative_hint: Option<SpeculativeResult>,
        emitter: StepEmitter,
        cancellation: CancellationFlag,
    ) {
        let start = Instant::now();

        if let Ok(Some(episode)) = self.memory.episodic().retrieve_similar_episode(&query_text).await {
            let info = Step::new(
                StepKind::Info,
                format!(
                    "Found a similar successful pattern (confidence {:.2}). Reusing proven approach.",
                    episode.confidence
                ),
            )
            .with_metadata("episode_confidence", serde_json::Value::from(episode.confidence))
            .with_metadata("episode_reuse_count", serde_json::Value::from(episode.reuse_count));
            if emitter.emit(info).await.is_err() {
                return;
            }
        }

        if cancellation.check().is_err() {
            return;
        }

        let complexity = classify(&query_text);
        tracing::info!(session_id = %session_id, ?complexity, "classified query");

        if should_take_fast_path(complexity) {
            self.run_speculative(&query_text, &session_id, top_k, &emitter, start).await;
            return;
        }

        self.run_agentic(query_text, session_id, top_k, speculative_hint, &emitter, &cancellation, start)
            .await;
    }

    async fn run_speculative(
        &self,
        query_text: &str,
        session_id: &str,
        top_k: usize,
        emitter: &StepEmitter,
        start: Instant,
    ) {
        match self.speculative.run(query_text, session_id, top_k).await {
            Ok(outcome) => {
                for step in outcome.steps {
                    if emitter.emit(step).await.is_err() {
                        return;
                    }
                }
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.quality
                    .lock()
                    .track_search(query_text, &outcome.result.sources, "speculative", Some(latency_ms));
            }
            Err(e) => {
                let _ = emitter
                    .emit(
                        Step::new(StepKind::Error, format!("Error processing query: {e}"))
                            .with_metadata("error", serde_json::Value::String(e.to_string())),
                    )
                    .await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agentic(
        &self,
        query_text: String,
        session_id: String,
        _top_k: usize,
        speculative_hint: Option<SpeculativeResult>,
        emitter: &StepEmitter,
        cancellation: &CancellationFlag,
        start: Instant,
    ) {
        let mut state = AgentState::new(query_text.clone(), session_id);
        state.speculative_hint = speculative_hint;

        let outcome = self.graph.run(&mut state, emitter, cancellation).await;

        match outcome {
            Ok(()) => {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.quality
                    .lock()
                    .track_search(&query_text, &state.retrieved_docs, "agentic", Some(latency_ms));
            }
            Err(e) => {
                let is_cancel = matches!(e, RagError::Cancelled { .. });
                if !is_cancel {
                    let _ = emitter
                        .emit(
                            Step::new(StepKind::Error, format!("Error processing query: {e}"))
                                .with_metadata("error", serde_json::Value::String(e.to_string())),
                        )
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use ragengine_config::{MemoryConfig, ModalityWeights, RetrievalConfig};
    use ragengine_core::error::Result as RagResult;
    use ragengine_core::traits::{ChatMessage, Embedder, GenerateParams};
    use ragengine_core::types::{Modality, SourceChunk};
    use ragengine_memory::{EpisodicMemory, LongTermMemory, ShortTermMemory};
    use ragengine_retrieval::{InMemoryBackends, MockEmbedder};

    struct EchoLlm;

    #[async_trait::async_trait]
    impl Llm for EchoLlm {
        async fn generate(&self, messages: &[ChatMessage], _params: &GenerateParams) -> RagResult<String> {
            Ok(format!("answer to: {}", messages.last().unwrap().content))
        }
    }

    fn build_agent(config: AgentConfig) -> Arc<RagAgent> {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::default());
        let backends = InMemoryBackends::new();

        let text = "rust ownership explained in depth";
        let v = futures::executor::block_on(embedder.embed(text)).unwrap();
        futures::executor::block_on(
            backends
                .vector
                .upsert(SourceChunk::new("c1", "d1", "Doc", text, 0.0, Modality::Text), v),
        )
        .unwrap();
        backends.keyword.index("c1", text);

        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&embedder),
            backends.vector.clone() as Arc<dyn ragengine_core::traits::VectorIndex>,
            backends.keyword.clone() as Arc<dyn ragengine_core::traits::KeywordIndex>,
            ModalityWeights::default(),
        ));
        let observation = Arc::new(ObservationProcessor::new(RetrievalConfig::default()));

        let stm = ShortTermMemory::new(backends.kv.clone() as Arc<dyn ragengine_core::traits::KVStore>, 3600);
        let ltm = Arc::new(LongTermMemory::new(
            backends.vector.clone() as Arc<dyn ragengine_core::traits::VectorIndex>,
            Arc::clone(&embedder),
            ragengine_config::LtmConfig::default(),
        ));
        let episodic = Arc::new(EpisodicMemory::new(
            Arc::clone(&ltm),
            Arc::clone(&embedder),
            ragengine_config::EpisodeConfig::default(),
        ));
        let memory = Arc::new(MemoryManager::new(stm, ltm, episodic, MemoryConfig::default()));

        Arc::new(RagAgent::new(
            retriever,
            observation,
            Arc::new(EchoLlm),
            memory,
            config,
            ragengine_config::RetryEnvelopeConfig::default(),
        ))
    }

    #[tokio::test]
    async fn process_query_rejects_blank_query_without_spawning() {
        let agent = build_agent(AgentConfig::default());
        let query = Query {
            text: "   ".to_string(),
            session_id: "s1".to_string(),
            top_k: 5,
            speculative_hint: None,
        };
        assert!(agent.process_query(query).is_err());
    }

    #[tokio::test]
    async fn simple_query_takes_speculative_path_and_emits_response() {
        let agent = build_agent(AgentConfig::builder().step_channel_capacity(8).build());
        let query = Query {
            text: "What is Rust?".to_string(),
            session_id: "s1".to_string(),
            top_k: 5,
            speculative_hint: None,
        };
        let (stream, _cancellation) = agent.process_query(query).unwrap();
        let steps: Vec<Step> = stream.collect().await;
        assert!(steps.iter().any(|s| s.kind == StepKind::Response));
        assert!(steps.iter().all(|s| s.kind != StepKind::Error));
    }

    #[tokio::test]
    async fn process_query_generates_session_id_when_blank() {
        let agent = build_agent(AgentConfig::builder().step_channel_capacity(8).build());
        let query = Query {
            text: "What is Rust?".to_string(),
            session_id: String::new(),
            top_k: 5,
            speculative_hint: None,
        };
        let (stream, _cancellation) = agent.process_query(query).unwrap();
        let steps: Vec<Step> = stream.collect().await;
        assert!(!steps.is_empty());
    }

    #[tokio::test]
    async fn cancellation_flag_stops_agentic_path_before_completion() {
        let agent = build_agent(AgentConfig::builder().step_channel_capacity(8).build());
        let query = Query {
            text: "Please compare and contrast and analyze and evaluate these two systems and their tradeoffs and pitfalls in great depth".to_string(),
            session_id: "s1".to_string(),
            top_k: 5,
            speculative_hint: None,
        };
        let (stream, cancellation) = agent.process_query(query).unwrap();
        cancellation.cancel();
        let steps: Vec<Step> = stream.collect().await;
        assert!(steps.iter().all(|s| s.kind != StepKind::Error));
    }
}
