//! Memory module - per-agent activity log, long-term thoughts and compaction

pub mod compaction;
mod observations;
mod state;

pub use compaction::{
    CompactionConfig, CompactionOutcome, CompactionPlan, CompactionReport, MemoryCompactor,
    plan_compaction,
};
pub use observations::{
    INITIAL_MEMORY_IMPORTANCE, automatic_memories_for, ingest_initial_memories,
    ingest_observations,
};
pub use state::{AutomaticShortTermMemory, LongTermMemory, LongTermRetention, MemoryState};
