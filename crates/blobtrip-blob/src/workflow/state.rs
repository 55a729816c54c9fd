use std::fmt;

use serde::Serialize;

/// Where a quickstart run is.
///
/// Forward path: `Init -> ContainerCreated -> PolicySet -> Uploaded -> Listed
/// -> Downloaded -> CleaningUp -> Done`. Any forward step may divert to
/// `Failed`, which still passes through `CleaningUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    ContainerCreated,
    PolicySet,
    Uploaded,
    Listed,
    Downloaded,
    CleaningUp,
    Done,
    Failed,
}

impl WorkflowState {
    /// The following state on the success path
    pub fn next(self) -> Option<WorkflowState> {
        use WorkflowState::*;
        match self {
            Init => Some(ContainerCreated),
            ContainerCreated => Some(PolicySet),
            PolicySet => Some(Uploaded),
            Uploaded => Some(Listed),
            Listed => Some(Downloaded),
            Downloaded => Some(CleaningUp),
            CleaningUp => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Init => "init",
            WorkflowState::ContainerCreated => "container_created",
            WorkflowState::PolicySet => "policy_set",
            WorkflowState::Uploaded => "uploaded",
            WorkflowState::Listed => "listed",
            WorkflowState::Downloaded => "downloaded",
            WorkflowState::CleaningUp => "cleaning_up",
            WorkflowState::Done => "done",
            WorkflowState::Failed => "failed",
        };
        f.write_str(s)
    }
}
