//! ABOUTME: Memory subsystem: short-term, long-term, and episodic memory
//! ABOUTME: Covers C6-C8 plus the coordinating MemoryManager

pub mod episodic;
pub mod ltm;
pub mod manager;
pub mod stm;

pub use episodic::EpisodicMemory;
pub use ltm::{compute_success_score, LongTermMemory, SuccessMetadata, UserFeedback};
pub use manager::MemoryManager;
pub use stm::ShortTermMemory;
