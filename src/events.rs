use serde::Serialize;
use uuid::Uuid;

use crate::jobs::JobState;
use crate::progress::ProgressSample;

/// Event broadcast to SSE subscribers on every job transition and progress
/// sample.
#[derive(Clone, Debug, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub state: JobState,
    pub percent: Option<u8>,
    pub elapsed_secs: Option<u64>,
    pub message: Option<String>,
}

impl JobEvent {
    pub fn state(job_id: Uuid, state: JobState) -> Self {
        Self {
            job_id,
            state,
            percent: None,
            elapsed_secs: None,
            message: None,
        }
    }

    pub fn progress(job_id: Uuid, sample: ProgressSample) -> Self {
        Self {
            job_id,
            state: JobState::Running,
            percent: Some(sample.percent),
            elapsed_secs: Some(sample.elapsed.as_secs()),
            message: None,
        }
    }

    pub fn finished(job_id: Uuid, state: JobState, message: Option<String>) -> Self {
        Self {
            job_id,
            state,
            percent: None,
            elapsed_secs: None,
            message,
        }
    }
}
