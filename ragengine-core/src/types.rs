//! Core data model shared by every ragengine crate.
//!
//! Types here are intentionally "dumb": plain data plus small constructors
//! and invariant-preserving helpers. Behavior lives in the crates that own
//! each component (`ragengine-retrieval`, `ragengine-memory`,
//! `ragengine-agent`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A retrieval/generation modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Table,
    Web,
}

/// A chunk of retrieved content, cited back to its source document.
///
/// Identity is `chunk_id`; two chunks with the same id are the same logical
/// source even if their scores differ across retrieval passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub text: String,
    pub score: f32,
    pub modality: Modality,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SourceChunk {
    #[must_use]
    pub fn new(
        chunk_id: impl Into<String>,
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        modality: Modality,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            document_id: document_id.into(),
            document_name: document_name.into(),
            text: text.into(),
            score,
            modality,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A named, abbreviated reference to a `SourceChunk`, as carried on a
/// response Step's `metadata.sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub document_name: String,
    pub chunk_id: String,
    pub score: f32,
}

impl From<&SourceChunk> for SourceRef {
    fn from(chunk: &SourceChunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            document_name: chunk.document_name.clone(),
            chunk_id: chunk.chunk_id.clone(),
            score: chunk.score,
        }
    }
}

/// The kind of a single progress event emitted on the Step stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Memory,
    Planning,
    Thought,
    Action,
    Observation,
    Reflection,
    Response,
    Error,
    Info,
}

impl StepKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Planning => "planning",
            Self::Thought => "thought",
            Self::Action => "action",
            Self::Observation => "observation",
            Self::Reflection => "reflection",
            Self::Response => "response",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

/// A single, ordered progress event produced during a `process_query` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub kind: StepKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Step {
    #[must_use]
    pub fn new(kind: StepKind, content: impl Into<String>) -> Self {
        let id_suffix = Uuid::new_v4().simple().to_string();
        Self {
            step_id: format!("{}_{}", kind.as_str(), &id_suffix[..8]),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One of the three tools the agentic path can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    VectorSearch,
    LocalData,
    WebSearch,
}

impl Tool {
    /// Parse a normalized action name (lowercase, spaces replaced with
    /// underscores) into a `Tool`, defaulting to `VectorSearch` for any
    /// unrecognized value per §4.10's react_reasoning parser.
    #[must_use]
    pub fn parse_or_default(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace(' ', "_");
        match normalized.as_str() {
            "local_data" => Self::LocalData,
            "web_search" => Self::WebSearch,
            _ => Self::VectorSearch,
        }
    }
}

/// A planned tool invocation, as produced by `react_reasoning`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub tool: Tool,
    pub input: HashMap<String, Value>,
    pub thought: String,
}

/// The outcome of executing an `Action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: Action,
    pub observation: String,
    pub retrieved: Vec<SourceChunk>,
    pub error: Option<String>,
}

/// A conversational role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Which path(s) contributed to producing a `Message`/`Interaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributingPath {
    Speculative,
    Agentic,
    Hybrid,
}

/// A single STM conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: ContributingPath) -> Self {
        let label = match path {
            ContributingPath::Speculative => "speculative",
            ContributingPath::Agentic => "agentic",
            ContributingPath::Hybrid => "hybrid",
        };
        self.metadata
            .insert("path".to_string(), Value::String(label.to_string()));
        self
    }
}

/// A persisted, vector-indexed interaction stored in LTM.
///
/// Immutable after insert; `success_score` is always clamped to `[0,1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub response: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub success_score: f32,
    pub source_count: usize,
    pub action_count: usize,
}

impl Interaction {
    /// Construct a new interaction, clamping `success_score` into `[0,1]`
    /// per invariant 5 of §3.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_text: impl Into<String>,
        query_embedding: Vec<f32>,
        response: impl Into<String>,
        session_id: impl Into<String>,
        success_score: f32,
        source_count: usize,
        action_count: usize,
    ) -> Self {
        Self {
            id: format!("ltm_{}", &Uuid::new_v4().simple().to_string()[..16]),
            query_text: query_text.into(),
            query_embedding,
            response: response.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            success_score: success_score.clamp(0.0, 1.0),
            source_count,
            action_count,
        }
    }
}

/// A reusable, on-demand-stored pattern in LTM (a degenerate `Interaction`
/// whose `session_id` is namespaced by pattern type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: String,
    pub pattern_type: String,
    pub description: String,
    pub description_embedding: Vec<f32>,
    pub payload: String,
    pub success_score: f32,
}

impl LearnedPattern {
    #[must_use]
    pub fn new(
        pattern_type: impl Into<String>,
        description: impl Into<String>,
        description_embedding: Vec<f32>,
        payload: impl Into<String>,
        success_score: f32,
    ) -> Self {
        Self {
            id: format!("pattern_{}", &Uuid::new_v4().simple().to_string()[..12]),
            pattern_type: pattern_type.into(),
            description: description.into(),
            description_embedding,
            payload: payload.into(),
            success_score: success_score.clamp(0.0, 1.0),
        }
    }

    /// The `session_id` prefix patterns are namespaced under in the LTM
    /// collection, per §4.7.
    #[must_use]
    pub fn session_id(pattern_type: &str) -> String {
        format!("pattern_{pattern_type}")
    }
}

/// A stored, reusable trace of a successful agentic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub query: String,
    pub query_embedding: Vec<f32>,
    pub actions: Vec<Action>,
    pub success: bool,
    pub confidence: f32,
    pub iterations: usize,
    pub elapsed_ms: u64,
    pub retrieved_docs_count: usize,
    pub reuse_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// A hint computed by the speculative path and optionally fed into the
/// agentic path as a precompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeculativeResult {
    pub response: String,
    pub sources: Vec<SourceChunk>,
    pub confidence_score: f32,
}

/// An inbound question, scoped to a session.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub session_id: String,
    pub top_k: usize,
    pub speculative_hint: Option<SpeculativeResult>,
}

impl Query {
    /// Validate the invariants from §6: non-blank text, `top_k` in `1..=100`.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.text.trim().is_empty() {
            return Err(crate::error::RagError::invalid_input("query text is empty"));
        }
        if self.top_k == 0 || self.top_k > 100 {
            return Err(crate::error::RagError::invalid_input(format!(
                "top_k must be in 1..=100, got {}",
                self.top_k
            )));
        }
        Ok(())
    }
}

/// The complexity bucket assigned by the query classifier (C11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// Decision produced by the `reflect` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionDecision {
    Continue,
    Synthesize,
    End,
}

/// Transient, per-Query state threaded through the agent graph (C10).
///
/// Owns the bookkeeping needed to uphold invariants 1-3 of §3:
/// `action_history` is capped by `max_iterations`, `retrieved_docs` is
/// deduplicated by `chunk_id` keeping the max score, and every Step pushed
/// here is also the next Step emitted on the stream.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query: String,
    pub session_id: String,
    pub planning_steps: Vec<String>,
    pub action_history: Vec<ActionResult>,
    pub retrieved_docs: Vec<SourceChunk>,
    pub reasoning_steps: Vec<Step>,
    pub memory_context: MemoryContext,
    pub current_action: Option<Action>,
    pub reflection_decision: Option<ReflectionDecision>,
    pub final_response: Option<String>,
    pub error: Option<String>,
    pub speculative_hint: Option<SpeculativeResult>,
}

impl AgentState {
    #[must_use]
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            planning_steps: Vec::new(),
            action_history: Vec::new(),
            retrieved_docs: Vec::new(),
            reasoning_steps: Vec::new(),
            memory_context: MemoryContext::default(),
            current_action: None,
            reflection_decision: None,
            final_response: None,
            error: None,
            speculative_hint: None,
        }
    }

    /// Append a chunk honoring invariant 2 of §3: dedup by `chunk_id`,
    /// keeping whichever copy has the higher score.
    pub fn merge_retrieved(&mut self, chunk: SourceChunk) {
        if let Some(existing) = self
            .retrieved_docs
            .iter_mut()
            .find(|c| c.chunk_id == chunk.chunk_id)
        {
            if chunk.score > existing.score {
                *existing = chunk;
            }
        } else {
            self.retrieved_docs.push(chunk);
        }
    }

    /// Append a Step to `reasoning_steps`. Callers are responsible for also
    /// forwarding the same Step to the Step stream (C12), upholding
    /// invariant 3 of §3.
    pub fn push_step(&mut self, step: Step) {
        self.reasoning_steps.push(step);
    }
}

/// Snapshot of STM/LTM context loaded for a Query, summarized for prompts.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub recent_history: Vec<Message>,
    pub similar_interactions: Vec<Interaction>,
    pub working_memory: HashMap<String, Value>,
    pub speculative_findings: Option<String>,
}

impl MemoryContext {
    #[must_use]
    pub fn summary(&self) -> String {
        if self.recent_history.is_empty() && self.similar_interactions.is_empty() {
            return "No prior context available.".to_string();
        }
        let mut parts = Vec::new();
        if !self.recent_history.is_empty() {
            parts.push(format!(
                "{} recent message(s) in this session",
                self.recent_history.len()
            ));
        }
        if !self.similar_interactions.is_empty() {
            parts.push(format!(
                "{} similar past interaction(s)",
                self.similar_interactions.len()
            ));
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_id_is_prefixed_by_kind() {
        let step = Step::new(StepKind::Memory, "loading context");
        assert!(step.step_id.starts_with("memory_"));
        assert_eq!(step.step_id.len(), "memory_".len() + 8);
    }

    #[test]
    fn interaction_clamps_success_score() {
        let too_high = Interaction::new("q", vec![0.1], "r", "s1", 1.5, 2, 1);
        assert_eq!(too_high.success_score, 1.0);
        let too_low = Interaction::new("q", vec![0.1], "r", "s1", -0.5, 2, 1);
        assert_eq!(too_low.success_score, 0.0);
    }

    #[test]
    fn merge_retrieved_dedups_by_chunk_id_keeping_max_score() {
        let mut state = AgentState::new("query", "session");
        state.merge_retrieved(SourceChunk::new("c1", "d1", "doc", "text", 0.5, Modality::Text));
        state.merge_retrieved(SourceChunk::new("c1", "d1", "doc", "text", 0.9, Modality::Text));
        state.merge_retrieved(SourceChunk::new("c1", "d1", "doc", "text", 0.3, Modality::Text));
        assert_eq!(state.retrieved_docs.len(), 1);
        assert_eq!(state.retrieved_docs[0].score, 0.9);
    }

    #[test]
    fn merge_retrieved_keeps_distinct_chunks() {
        let mut state = AgentState::new("query", "session");
        state.merge_retrieved(SourceChunk::new("c1", "d1", "doc", "text", 0.5, Modality::Text));
        state.merge_retrieved(SourceChunk::new("c2", "d1", "doc", "text", 0.9, Modality::Text));
        assert_eq!(state.retrieved_docs.len(), 2);
    }

    #[test]
    fn query_rejects_blank_text() {
        let query = Query {
            text: "   ".to_string(),
            session_id: "s1".to_string(),
            top_k: 5,
            speculative_hint: None,
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn query_rejects_out_of_range_top_k() {
        let base = Query {
            text: "hello".to_string(),
            session_id: "s1".to_string(),
            top_k: 0,
            speculative_hint: None,
        };
        assert!(base.validate().is_err());
        let too_big = Query {
            top_k: 101,
            ..base
        };
        assert!(too_big.validate().is_err());
    }

    #[test]
    fn tool_parse_or_default_normalizes_and_falls_back() {
        assert_eq!(Tool::parse_or_default("Web Search"), Tool::WebSearch);
        assert_eq!(Tool::parse_or_default("local_data"), Tool::LocalData);
        assert_eq!(Tool::parse_or_default("nonsense"), Tool::VectorSearch);
    }
}
