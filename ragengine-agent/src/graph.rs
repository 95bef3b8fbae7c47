//! ABOUTME: Agent Graph (C10)
//! ABOUTME: ReAct/CoT state machine: load_memory -> cot_planning -> react_reasoning ->
//! ABOUTME: execute_action -> reflect -> [continue | synthesize -> save_memory | end]

use crate::stream::{CancellationFlag, StepEmitter};
use ragengine_config::AgentConfig;
use ragengine_core::error::{RagError, Result};
use ragengine_core::retry::{retry_with_backoff, RetryConfig};
use ragengine_core::traits::{ChatMessage, GenerateParams, Llm};
use ragengine_core::types::{
    Action, ActionResult, AgentState, ContributingPath, Modality, ReflectionDecision, SourceRef, Step, StepKind, Tool,
};
use ragengine_memory::{MemoryManager, SuccessMetadata};
use ragengine_retrieval::{HybridRetriever, ObservationProcessor, ObservationStats};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MAX_CITED_SOURCES: usize = 5;
const MAX_SYNTHESIS_CHUNKS: usize = 10;
const MAX_CHUNK_CHARS: usize = 1000;

/// Line-prefix parser for a ReAct turn's raw LLM output, mirroring
/// `_parse_react_response`: looks for `Thought:`/`Action:`/`Action Input:`
/// lines; the action input falls back to a raw query string (the thought,
/// or the raw input text) when it isn't valid JSON.
fn parse_react_response(text: &str) -> (String, Tool, HashMap<String, Value>) {
    let mut thought = String::new();
    let mut action_raw = String::new();
    let mut input_raw = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Thought:") {
            thought = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("Action:") {
            action_raw = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("Action Input:") {
            input_raw = rest.trim().to_string();
        }
    }

    let tool = Tool::parse_or_default(&action_raw);
    let input = serde_json::from_str::<HashMap<String, Value>>(&input_raw).unwrap_or_else(|_| {
        let mut map = HashMap::new();
        let fallback = if input_raw.is_empty() { thought.clone() } else { input_raw.clone() };
        map.insert("query".to_string(), Value::String(fallback));
        map
    });

    (thought, tool, input)
}

/// Parser for the `reflect` node's raw LLM output, mirroring
/// `_parse_reflection_decision`: prefers an explicit `decision:` line, then
/// falls back to a substring search across the whole text, defaulting to
/// `Synthesize` when nothing matches.
fn parse_reflection_decision(text: &str) -> ReflectionDecision {
    let lower = text.to_lowercase();
    for line in lower.lines() {
        if let Some(rest) = line.trim().strip_prefix("decision:") {
            let rest = rest.trim();
            if rest.contains("continue") {
                return ReflectionDecision::Continue;
            }
            if rest.contains("synthesize") {
                return ReflectionDecision::Synthesize;
            }
            if rest.contains("end") {
                return ReflectionDecision::End;
            }
        }
    }
    if lower.contains("continue") {
        return ReflectionDecision::Continue;
    }
    if lower.contains("end") {
        return ReflectionDecision::End;
    }
    ReflectionDecision::Synthesize
}

/// Graph routing after `reflect`, mirroring `_should_continue`: the
/// iteration cap and an exhausted plan both force `Synthesize`; an `End`
/// decision with nothing retrieved is honored outright; otherwise the raw
/// decision passes through.
fn route_after_reflect(state: &AgentState, config: &AgentConfig) -> ReflectionDecision {
    let completed = state.action_history.len();
    if completed >= config.max_iterations {
        return ReflectionDecision::Synthesize;
    }

    let decision = state.reflection_decision.unwrap_or(ReflectionDecision::Synthesize);
    let plan_exhausted = !state.planning_steps.is_empty() && completed >= state.planning_steps.len();
    if plan_exhausted && decision == ReflectionDecision::Continue {
        return ReflectionDecision::Synthesize;
    }
    if decision == ReflectionDecision::End && state.retrieved_docs.is_empty() {
        return ReflectionDecision::End;
    }
    decision
}

/// The full ReAct/CoT agent graph (C10) for queries that need more than a
/// single retrieval pass. Grounded on `_create_agent_graph`'s node wiring,
/// re-expressed as an explicit Rust loop instead of a graph-execution
/// library, since the reference framework itself is out of scope.
pub struct AgentGraph {
    retriever: Arc<HybridRetriever>,
    observation: Arc<ObservationProcessor>,
    llm: Arc<dyn Llm>,
    memory: Arc<MemoryManager>,
    config: AgentConfig,
    retry: RetryConfig,
}

impl AgentGraph {
    #[must_use]
    pub fn new(
        retriever: Arc<HybridRetriever>,
        observation: Arc<ObservationProcessor>,
        llm: Arc<dyn Llm>,
        memory: Arc<MemoryManager>,
        config: AgentConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            retriever,
            observation,
            llm,
            memory,
            config,
            retry,
        }
    }

    /// LLM calls go through the retry envelope (§4.13): transport/timeout
    /// failures are retried with backoff, validation failures short-circuit.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        retry_with_backoff(&self.retry, || async {
            self.llm.generate(messages, &GenerateParams::default()).await
        })
        .await
    }

    async fn load_memory(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let context = self
            .memory
            .context_for_query(&state.session_id, &state.query, true, None)
            .await;
        let summary = context.summary();
        state.memory_context = context;
        let step = Step::new(StepKind::Memory, format!("Loaded memory context: {summary}"));
        state.push_step(step.clone());
        emitter.emit(step).await?;

        // §3 invariant 7 / §4.10: when a speculative hint is present, both
        // paths are joint contributors. Seed retrieved_docs with the hint's
        // sources (tagged speculative) before the agentic pass begins.
        if let Some(hint) = state.speculative_hint.clone() {
            for mut chunk in hint.sources {
                chunk
                    .metadata
                    .insert("path".to_string(), Value::String("speculative".to_string()));
                state.merge_retrieved(chunk);
            }
            let incorporate_step = Step::new(StepKind::Info, "incorporate_speculative")
                .with_metadata("incorporate_speculative", Value::Bool(true))
                .with_metadata("speculative_confidence", Value::from(hint.confidence_score));
            state.push_step(incorporate_step.clone());
            emitter.emit(incorporate_step).await?;
        }

        Ok(())
    }

    async fn cot_planning(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let prompt = vec![
            ChatMessage::new(
                "system",
                "Break the user's question into a short numbered list of steps needed to answer it.",
            ),
            ChatMessage::new("user", &state.query),
        ];
        let plan_text = self.generate(&prompt).await?;
        state.planning_steps = plan_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ' ')
                    .trim()
                    .to_string()
            })
            .filter(|line| !line.is_empty())
            .collect();

        let step = Step::new(StepKind::Planning, plan_text)
            .with_metadata("step_count", Value::from(state.planning_steps.len()));
        state.push_step(step.clone());
        emitter.emit(step).await
    }

    async fn react_reasoning(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let history_summary = state
            .action_history
            .iter()
            .map(|result| format!("- used {:?}: {}", result.action.tool, result.observation))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = vec![
            ChatMessage::new(
                "system",
                "Reason step by step using the format:\nThought: ...\nAction: vector_search|local_data|web_search\nAction Input: <json or text>",
            ),
            ChatMessage::new(
                "user",
                format!(
                    "Question: {}\nPlan: {}\nHistory so far:\n{}",
                    state.query,
                    state.planning_steps.join("; "),
                    history_summary
                ),
            ),
        ];
        match self.generate(&prompt).await {
            Ok(raw) => {
                let (thought, tool, input) = parse_react_response(&raw);

                state.current_action = Some(Action {
                    tool,
                    input,
                    thought: thought.clone(),
                });

                let step = Step::new(StepKind::Thought, thought);
                state.push_step(step.clone());
                emitter.emit(step).await
            }
            Err(e) => {
                // Retry envelope exhausted: default to a vector_search over
                // the current query rather than failing the whole run.
                let mut input = HashMap::new();
                input.insert("query".to_string(), Value::String(state.query.clone()));
                state.current_action = Some(Action {
                    tool: Tool::VectorSearch,
                    input,
                    thought: "reasoning unavailable, defaulting to vector search".to_string(),
                });

                let error_step = Step::new(
                    StepKind::Error,
                    format!("reasoning failed, defaulting to vector_search: {e}"),
                );
                state.push_step(error_step.clone());
                emitter.emit(error_step).await
            }
        }
    }

    async fn execute_action(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let action = state
            .current_action
            .take()
            .ok_or_else(|| RagError::internal("execute_action called with no pending action"))?;

        let query_text = action
            .input
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(&state.query)
            .to_string();

        let step = Step::new(StepKind::Action, format!("{:?}: {}", action.tool, query_text));
        state.push_step(step.clone());
        emitter.emit(step).await?;

        // `local_data`/`web_search` route through the same hybrid backend as
        // `vector_search`: dedicated local-file and web-search backends are
        // out of scope, so every tool shares the configured retriever.
        let retrieved = retry_with_backoff(&self.retry, || self.retriever.retrieve_text(&query_text, 5, None)).await;

        let action_result = match retrieved {
            Ok(chunks) => {
                let mut stats = ObservationStats::new();
                let observed = self
                    .observation
                    .process(&query_text, chunks, &state.retrieved_docs, &mut stats);
                for chunk in observed.clone() {
                    state.merge_retrieved(chunk);
                }
                let observation_text = format!("found {} relevant result(s)", observed.len());
                ActionResult {
                    action,
                    observation: observation_text,
                    retrieved: observed,
                    error: None,
                }
            }
            Err(e) => ActionResult {
                action,
                observation: format!("search failed: {e}"),
                retrieved: Vec::new(),
                error: Some(e.to_string()),
            },
        };

        let observation_step = Step::new(StepKind::Observation, action_result.observation.clone());
        state.push_step(observation_step.clone());
        state.action_history.push(action_result);
        emitter.emit(observation_step).await
    }

    async fn reflect(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let prompt = vec![
            ChatMessage::new(
                "system",
                "Given the question and what's been found so far, decide: continue, synthesize, or end.\nRespond with a line \"Decision: <continue|synthesize|end>\".",
            ),
            ChatMessage::new(
                "user",
                format!(
                    "Question: {}\nRetrieved so far: {} document(s) across {} action(s).",
                    state.query,
                    state.retrieved_docs.len(),
                    state.action_history.len()
                ),
            ),
        ];
        let raw = self.generate(&prompt).await?;
        let decision = parse_reflection_decision(&raw);
        state.reflection_decision = Some(decision);

        let step = Step::new(StepKind::Reflection, raw)
            .with_metadata("decision", Value::String(format!("{decision:?}")));
        state.push_step(step.clone());
        emitter.emit(step).await
    }

    async fn synthesize(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let mut ranked = state.retrieved_docs.clone();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let top_chunks: Vec<_> = ranked.into_iter().take(MAX_SYNTHESIS_CHUNKS).collect();

        let context: String = top_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let text = if chunk.modality == Modality::Image {
                    format!("[IMAGE SOURCE] {}", chunk.text)
                } else if chunk.text.chars().count() > MAX_CHUNK_CHARS {
                    let truncated: String = chunk.text.chars().take(MAX_CHUNK_CHARS).collect();
                    format!("{truncated}...")
                } else {
                    chunk.text.clone()
                };
                format!("[{}] {}", i + 1, text)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let hint_section = state
            .speculative_hint
            .as_ref()
            .map(|hint| format!("\n\nInitial response to validate:\n{}", hint.response))
            .unwrap_or_default();

        let prompt = vec![
            ChatMessage::new(
                "system",
                format!("Answer the user's question using only the sources below.\n\n{context}{hint_section}"),
            ),
            ChatMessage::new("user", &state.query),
        ];

        let has_speculative = state.speculative_hint.is_some();
        let response = match self.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => format!(
                "I encountered an error while generating a response. I found {} documents. Error: {e}",
                state.retrieved_docs.len()
            ),
        };
        state.final_response = Some(response.clone());

        let cited: Vec<SourceRef> = top_chunks.iter().take(MAX_CITED_SOURCES).map(SourceRef::from).collect();
        let sources_json = serde_json::to_value(&cited)
            .map_err(|e| RagError::internal(format!("failed to serialize sources: {e}")))?;

        let step = Step::new(StepKind::Response, response)
            .with_metadata("sources", sources_json)
            .with_metadata("path", Value::String("agentic".to_string()))
            .with_metadata("has_speculative", Value::Bool(has_speculative));
        state.push_step(step.clone());
        emitter.emit(step).await
    }

    /// Records a memory Step (§4.10). `contributing_paths` is `["agentic"]`
    /// unless a speculative hint joined this run, in which case it's
    /// `["speculative", "agentic"]` and STM is tagged `hybrid`.
    async fn save_memory(&self, state: &mut AgentState, emitter: &StepEmitter) -> Result<()> {
        let Some(response) = state.final_response.clone() else {
            return Ok(());
        };

        let has_hint = state.speculative_hint.is_some();
        let path = if has_hint {
            ContributingPath::Hybrid
        } else {
            ContributingPath::Agentic
        };
        let contributing_paths: Vec<&'static str> = if has_hint {
            vec!["speculative", "agentic"]
        } else {
            vec!["agentic"]
        };

        let metadata = SuccessMetadata {
            source_count: state.retrieved_docs.len(),
            action_count: state.action_history.len(),
            has_citations: !state.retrieved_docs.is_empty(),
            user_feedback: None,
        };
        self.memory
            .consolidate(&state.session_id, &state.query, &response, true, &metadata, path)
            .await;

        let confidence = if state.retrieved_docs.is_empty() {
            0.3
        } else {
            (state.retrieved_docs.iter().map(|c| c.score).sum::<f32>() / state.retrieved_docs.len() as f32)
                .clamp(0.0, 1.0)
        };
        let actions: Vec<Action> = state
            .action_history
            .iter()
            .map(|result| result.action.clone())
            .collect();
        let _ = self
            .memory
            .episodic()
            .store_episode(
                &state.query,
                actions,
                state.error.is_none(),
                confidence,
                state.action_history.len(),
                0,
                state.retrieved_docs.len(),
            )
            .await;

        let step = Step::new(StepKind::Memory, "Consolidated interaction into memory")
            .with_metadata("contributing_paths", Value::from(contributing_paths));
        state.push_step(step.clone());
        emitter.emit(step).await
    }

    /// Drive `state` through the full graph, emitting Steps as each node
    /// completes. Returns once the graph reaches `synthesize -> save_memory`
    /// or `end`, or errors with `RagError::Timeout` if the whole run exceeds
    /// `AgentConfig::query_timeout_seconds`.
    ///
    /// # Errors
    /// Propagates LLM/retrieval failures, cancellation, and timeout.
    pub async fn run(
        &self,
        state: &mut AgentState,
        emitter: &StepEmitter,
        cancellation: &CancellationFlag,
    ) -> Result<()> {
        let budget = Duration::from_secs(self.config.query_timeout_seconds);
        match tokio::time::timeout(budget, self.run_inner(state, emitter, cancellation)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::timeout(format!(
                "agent graph exceeded {}s timeout",
                self.config.query_timeout_seconds
            ))),
        }
    }

    async fn run_inner(
        &self,
        state: &mut AgentState,
        emitter: &StepEmitter,
        cancellation: &CancellationFlag,
    ) -> Result<()> {
        self.load_memory(state, emitter).await?;
        self.cot_planning(state, emitter).await?;

        loop {
            cancellation.check()?;
            self.react_reasoning(state, emitter).await?;
            self.execute_action(state, emitter).await?;
            self.reflect(state, emitter).await?;

            match route_after_reflect(state, &self.config) {
                ReflectionDecision::Continue => continue,
                ReflectionDecision::Synthesize => {
                    self.synthesize(state, emitter).await?;
                    self.save_memory(state, emitter).await?;
                    return Ok(());
                }
                ReflectionDecision::End => return Ok(()),
            }
        }
    }
}
