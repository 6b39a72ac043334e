// PostgreSQL + pgvector persistence layer.
//
// One table per entity (snapshots, agent work, agent definitions), SQL
// views for the derived read models, and a single transactional upsert
// as the only write path for snapshots.

mod agents;
mod error;
mod quality;
mod reads;
mod records;
mod schema;
mod store;

pub use error::{Error, Result};
pub use quality::quality_score;
pub use records::{
    AgentPerformanceRow, AgentWorkListing, AgentWorkOutcome, BugRow, DecisionRow, FileActivityRow,
    PersistAction, PersistOutcome, PhraseHit, ProjectStatsRow, QualityReport, QualityRow,
    RawMessageHit, SemanticHit, SnapshotListing, StoredSnapshot, SystemStats, TimelineRow,
    ToolUsageRow, VersionComparisonRow,
};
pub use store::{Store, StoreConfig};
