//! ABOUTME: Core traits, types, and infrastructure for ragengine
//! ABOUTME: Foundation layer providing the data model and external trait seams

pub mod error;
pub mod logging;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{RagError, Result};
pub use traits::{ChatMessage, Embedder, Filters, GenerateParams, ImageIndex, KVStore, KeywordIndex, Llm, TableIndex, VectorIndex};
pub use types::{
    Action, ActionResult, AgentState, Complexity, ContributingPath, Episode, Interaction,
    LearnedPattern, MemoryContext, Message, Modality, Query, ReflectionDecision, Role,
    SourceChunk, SourceRef, SpeculativeResult, Step, StepKind, Tool,
};
