use engram_types::{AgentCaptureRequest, CaptureRequest};

/// One unit of accepted, not-yet-processed work.
#[derive(Debug, Clone)]
pub enum CaptureJob {
    Snapshot(CaptureRequest),
    AgentWork(AgentCaptureRequest),
}

impl CaptureJob {
    /// Origin tuple for log lines: (project-or-session, trigger-or-agent).
    pub fn origin(&self) -> (String, String) {
        match self {
            CaptureJob::Snapshot(req) => (req.project_path.clone(), req.trigger.clone()),
            CaptureJob::AgentWork(req) => {
                (req.parent_session_id.clone(), req.agent_id.clone())
            }
        }
    }
}
