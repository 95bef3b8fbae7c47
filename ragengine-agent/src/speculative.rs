//! ABOUTME: Speculative Path (C9)
//! ABOUTME: Single-pass fast path for simple queries: memory, retrieve, synthesize, consolidate

use ragengine_config::AgentConfig;
use ragengine_core::error::{RagError, Result};
use ragengine_core::traits::{ChatMessage, Embedder, GenerateParams, Llm};
use ragengine_core::types::{ContributingPath, SourceChunk, SourceRef, SpeculativeResult, Step, StepKind};
use ragengine_memory::{MemoryManager, SuccessMetadata};
use ragengine_retrieval::{HybridRetriever, ObservationProcessor, ObservationStats};
use serde_json::Value;
use std::sync::Arc;

const MAX_CITED_SOURCES: usize = 5;

/// Everything produced by a single speculative-path run: the ordered steps
/// emitted for the Step stream, and the result itself.
pub struct SpeculativeOutcome {
    pub steps: Vec<Step>,
    pub result: SpeculativeResult,
}

/// Confidence per §4.9: `min(1.0, retrieved_count / max(top_k, 1))`.
fn confidence_from_sources(sources: &[SourceChunk], top_k: usize) -> f32 {
    (sources.len() as f32 / top_k.max(1) as f32).min(1.0)
}

fn build_prompt(query: &str, memory_summary: &str, sources: &[SourceChunk]) -> Vec<ChatMessage> {
    let mut context = String::new();
    for (i, chunk) in sources.iter().enumerate() {
        context.push_str(&format!("[{}] {}\n", i + 1, chunk.text));
    }
    let system = format!(
        "You are a retrieval-augmented assistant. Prior context: {memory_summary}\n\nRetrieved sources:\n{context}"
    );
    vec![
        ChatMessage::new("system", system),
        ChatMessage::new("user", query),
    ]
}

/// The fast, single-pass path for queries classified `Simple` (C11): load
/// memory, run one hybrid retrieval, synthesize directly, consolidate.
/// Grounded on `_fast_path_query`'s linear memory->search->synthesize->
/// respond->consolidate flow, with no ReAct iteration.
pub struct SpeculativePath {
    retriever: Arc<HybridRetriever>,
    observation: Arc<ObservationProcessor>,
    llm: Arc<dyn Llm>,
    memory: Arc<MemoryManager>,
    config: AgentConfig,
}

impl SpeculativePath {
    #[must_use]
    pub fn new(
        retriever: Arc<HybridRetriever>,
        observation: Arc<ObservationProcessor>,
        llm: Arc<dyn Llm>,
        memory: Arc<MemoryManager>,
        config: AgentConfig,
    ) -> Self {
        Self {
            retriever,
            observation,
            llm,
            memory,
            config,
        }
    }

    /// Run the speculative path end to end. On internal failure the error is
    /// propagated so the caller can fall back to the full agentic graph
    /// rather than surfacing a partial answer.
    ///
    /// # Errors
    /// Propagates memory, retrieval, or LLM failures.
    pub async fn run(&self, query: &str, session_id: &str, top_k: usize) -> Result<SpeculativeOutcome> {
        let _ = &self.config;
        let mut steps = Vec::new();

        let memory_context = self
            .memory
            .context_for_query(session_id, query, true, None)
            .await;
        steps.push(Step::new(
            StepKind::Memory,
            format!("Loaded memory context: {}", memory_context.summary()),
        ));

        steps.push(Step::new(
            StepKind::Action,
            format!("Searching knowledge base for: {query}"),
        ));
        let retrieved = self.retriever.retrieve_text(query, top_k, None).await?;

        let mut stats = ObservationStats::new();
        let observed = self.observation.process(query, retrieved, &[], &mut stats);
        steps.push(Step::new(
            StepKind::Observation,
            format!("Kept {} of {} retrieved chunks", stats.total_kept, stats.total_seen),
        ));

        let prompt = build_prompt(query, &memory_context.summary(), &observed);
        let response = self
            .llm
            .generate(&prompt, &GenerateParams::default())
            .await
            .map_err(|e| RagError::model_error(format!("speculative synthesis failed: {e}")))?;

        let cited: Vec<SourceRef> = observed
            .iter()
            .take(MAX_CITED_SOURCES)
            .map(SourceRef::from)
            .collect();
        let sources_json = serde_json::to_value(&cited)
            .map_err(|e| RagError::internal(format!("failed to serialize sources: {e}")))?;

        let confidence_score = confidence_from_sources(&observed, top_k);

        steps.push(Step::new(
            StepKind::Thought,
            format!("Confidence in this answer: {confidence_score:.2}"),
        ));

        let response_step = Step::new(StepKind::Response, response.clone())
            .with_metadata("sources", sources_json)
            .with_metadata("path", Value::String("speculative".to_string()));
        steps.push(response_step);

        let metadata = SuccessMetadata {
            source_count: observed.len(),
            action_count: 1,
            has_citations: !cited.is_empty(),
            user_feedback: None,
        };
        self.memory
            .consolidate(
                session_id,
                query,
                &response,
                true,
                &metadata,
                ContributingPath::Speculative,
            )
            .await;

        Ok(SpeculativeOutcome {
            steps,
            result: SpeculativeResult {
                response,
                sources: observed,
                confidence_score,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_config::{MemoryConfig, ModalityWeights, RetrievalConfig};
    use ragengine_core::types::Modality;
    use ragengine_memory::{EpisodicMemory, LongTermMemory, ShortTermMemory};
    use ragengine_retrieval::{InMemoryBackends, MockEmbedder};

    struct EchoLlm;

    #[async_trait::async_trait]
    impl Llm for EchoLlm {
        async fn generate(&self, messages: &[ChatMessage], _params: &GenerateParams) -> Result<String> {
            Ok(format!("answer to: {}", messages.last().unwrap().content))
        }
    }

    struct FailingLlm;

    #[async_trait::async_trait]
    impl Llm for FailingLlm {
        async fn generate(&self, _messages: &[ChatMessage], _params: &GenerateParams) -> Result<String> {
            Err(RagError::model_error("backend down"))
        }
    }

    fn build(llm: Arc<dyn Llm>) -> SpeculativePath {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::default());
        let backends = InMemoryBackends::new();

        let q = "rust ownership rules";
        let v = futures::executor::block_on(embedder.embed(q)).unwrap();
        futures::executor::block_on(
            backends
                .vector
                .upsert(SourceChunk::new("c1", "d1", "Doc", "rust ownership explained", 0.0, Modality::Text), v),
        )
        .unwrap();
        backends.keyword.index("c1", "rust ownership explained");

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

        SpeculativePath::new(retriever, observation, llm, memory, AgentConfig::default())
    }

    #[tokio::test]
    async fn run_produces_memory_action_observation_thought_response_steps() {
        let path = build(Arc::new(EchoLlm));
        let outcome = path.run("rust ownership rules", "s1", 5).await.unwrap();
        let kinds: Vec<StepKind> = outcome.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Memory,
                StepKind::Action,
                StepKind::Observation,
                StepKind::Thought,
                StepKind::Response,
            ]
        );
    }

    #[tokio::test]
    async fn run_propagates_llm_failure() {
        let path = build(Arc::new(FailingLlm));
        let result = path.run("rust ownership rules", "s1", 5).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn confidence_is_zero_weighted_when_no_sources_found() {
        let path = build(Arc::new(EchoLlm));
        let outcome = path.run("completely unrelated gibberish query", "s1", 5).await.unwrap();
        assert!(outcome.result.confidence_score <= 1.0);
    }

    #[test]
    fn confidence_from_sources_matches_retrieved_over_top_k_ratio() {
        let sources = vec![
            chunk_fixture("a", 0.9),
            chunk_fixture("b", 0.8),
            chunk_fixture("c", 0.7),
        ];
        assert_eq!(confidence_from_sources(&sources, 5), 0.6);
        assert_eq!(confidence_from_sources(&[], 5), 0.0);
    }

    #[test]
    fn confidence_from_sources_caps_at_one() {
        let sources = vec![chunk_fixture("a", 0.9), chunk_fixture("b", 0.8), chunk_fixture("c", 0.7)];
        assert_eq!(confidence_from_sources(&sources, 2), 1.0);
    }

    fn chunk_fixture(id: &str, score: f32) -> SourceChunk {
        SourceChunk::new(id, "doc1", "Doc One", "text", score, ragengine_core::types::Modality::Text)
    }
}
