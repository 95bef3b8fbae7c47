//! ABOUTME: Retrieval subsystem: embedding, backends, hybrid fusion, reranking, observations
//! ABOUTME: Covers C1-C5 of the retrieval pipeline

pub mod backends;
pub mod embedding;
pub mod hybrid;
pub mod observation;
pub mod reranker;

pub use backends::{
    InMemoryBackends, InMemoryImageIndex, InMemoryKVStore, InMemoryKeywordIndex, InMemoryTableIndex,
    InMemoryVectorIndex,
};
pub use embedding::{EmbeddingGateway, MockEmbedder, RawEmbedder};
pub use hybrid::{reciprocal_rank_fusion, HybridRetriever};
pub use observation::{ObservationProcessor, ObservationStats};
pub use reranker::{AdaptiveReranker, CrossEncoder};
