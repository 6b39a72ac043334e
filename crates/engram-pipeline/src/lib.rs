mod coordinator;
mod error;
mod job;
mod worker;

pub use coordinator::{derive_agent_activity, AgentActivity, Coordinator};
pub use error::{Error, Result};
pub use job::CaptureJob;
pub use worker::{spawn_pool, JobRunner, PipelineConfig, PipelineHandle, WorkerPool};
