//! ABOUTME: Memory Manager
//! ABOUTME: Coordinates STM, LTM, and episodic memory behind a single entrypoint

use crate::episodic::EpisodicMemory;
use crate::ltm::{LongTermMemory, SuccessMetadata};
use crate::stm::ShortTermMemory;
use ragengine_config::MemoryConfig;
use ragengine_core::error::Result;
use ragengine_core::types::{ContributingPath, MemoryContext, Role};
use std::sync::Arc;

/// Unified manager over short-term, long-term, and episodic memory (§4.6-4.8),
/// the single collaborator the agent graph (C10) talks to for memory I/O.
///
/// Mirrors `DefaultMemoryManager`'s composition of independently-pluggable
/// subsystems behind one concrete type.
pub struct MemoryManager {
    stm: ShortTermMemory,
    ltm: Arc<LongTermMemory>,
    episodic: Arc<EpisodicMemory>,
    config: MemoryConfig,
}

impl MemoryManager {
    #[must_use]
    pub fn new(
        stm: ShortTermMemory,
        ltm: Arc<LongTermMemory>,
        episodic: Arc<EpisodicMemory>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            stm,
            ltm,
            episodic,
            config,
        }
    }

    /// Load combined STM/LTM context for a query (`load_memory` node input).
    /// Individual subsystem failures degrade to an empty slice rather than
    /// failing the whole call, so a memory-backend hiccup never blocks the
    /// agent graph.
    pub async fn context_for_query(
        &self,
        session_id: &str,
        query: &str,
        include_similar_interactions: bool,
        max_similar: Option<usize>,
    ) -> MemoryContext {
        let recent_history = self
            .stm
            .conversation_history(session_id, Some(self.config.max_history_length))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, session_id, "failed to load conversation history");
                Vec::new()
            });

        let working_memory = self
            .stm
            .all_working_memory(session_id)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, session_id, "failed to load working memory");
                std::collections::HashMap::new()
            });

        let similar_interactions = if include_similar_interactions {
            let top_k = max_similar.unwrap_or(self.config.max_similar_interactions);
            self.ltm
                .retrieve_similar_interactions(query, top_k, self.config.ltm.similarity_threshold)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "failed to retrieve similar interactions");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        MemoryContext {
            recent_history,
            similar_interactions,
            working_memory,
            speculative_findings: None,
        }
    }

    /// Record a completed query/response cycle: always appends to STM,
    /// consolidates into LTM only when `success` (§4.7). Never fails the
    /// caller; consolidation failures are logged and swallowed, matching the
    /// "memory failure shouldn't break the flow" policy. Both STM entries are
    /// tagged with `path`, identifying which path(s) produced this cycle.
    pub async fn consolidate(
        &self,
        session_id: &str,
        query: &str,
        response: &str,
        success: bool,
        metadata: &SuccessMetadata,
        path: ContributingPath,
    ) -> Option<String> {
        if let Err(e) = self
            .stm
            .add_message(session_id, Role::User, query, Some(path))
            .await
        {
            tracing::error!(error = %e, session_id, "failed to append user message to STM");
        }
        if let Err(e) = self
            .stm
            .add_message(session_id, Role::Assistant, response, Some(path))
            .await
        {
            tracing::error!(error = %e, session_id, "failed to append assistant message to STM");
        }

        if !success {
            return None;
        }

        match self
            .ltm
            .store_interaction(query, response, session_id, metadata)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, session_id, "failed to consolidate interaction into LTM");
                None
            }
        }
    }

    /// # Errors
    /// Propagates the STM backend's failure.
    pub async fn add_working_memory(
        &self,
        session_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        self.stm.store_working_memory(session_id, key, value).await
    }

    /// # Errors
    /// Propagates the STM backend's failure.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.stm.clear_session(session_id).await
    }

    #[must_use]
    pub fn episodic(&self) -> &Arc<EpisodicMemory> {
        &self.episodic
    }

    #[must_use]
    pub fn ltm(&self) -> &Arc<LongTermMemory> {
        &self.ltm
    }
}
