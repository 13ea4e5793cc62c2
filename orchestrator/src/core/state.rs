//! Per-subject outcomes and the end-of-run summary
//!
//! Pure bookkeeping: the pipeline produces one `SubjectOutcome` per subject
//! and the orchestrator folds them into a `RunSummary`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared::{FailureKind, Recording, Stage, SubjectId, SubjectState};

/// Why a subject produced no result without being an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Too little usable signal survived cleaning
    InsufficientData { message: String },
    /// A stage-only pass found its input artifact absent
    NotReady { missing: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientData { message } => write!(f, "insufficient data: {message}"),
            SkipReason::NotReady { missing } => write!(f, "{missing} artifact not present"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// Every requested stage is complete; `ran` lists the ones executed now
    Completed { ran: Vec<Stage> },
    Skipped { stage: Stage, reason: SkipReason },
    Failed { stage: Stage, kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectOutcome {
    pub recording: Recording,
    pub state: SubjectState,
    pub status: OutcomeStatus,
}

impl SubjectOutcome {
    pub fn completed(recording: Recording, state: SubjectState, ran: Vec<Stage>) -> Self {
        Self {
            recording,
            state,
            status: OutcomeStatus::Completed { ran },
        }
    }

    pub fn skipped(recording: Recording, state: SubjectState, stage: Stage, reason: SkipReason) -> Self {
        Self {
            recording,
            state,
            status: OutcomeStatus::Skipped { stage, reason },
        }
    }

    pub fn failed(recording: Recording, stage: Stage, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            recording,
            state: SubjectState::Failed(kind.clone()),
            status: OutcomeStatus::Failed {
                stage,
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.recording.subject
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Stages executed in this run, empty unless completed
    pub fn stages_run(&self) -> &[Stage] {
        match &self.status {
            OutcomeStatus::Completed { ran } => ran,
            _ => &[],
        }
    }
}

/// Result of one batch invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SubjectOutcome>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, outcomes: Vec<SubjectOutcome>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn outcome(&self, subject: &str) -> Option<&SubjectOutcome> {
        self.outcomes.iter().find(|o| o.subject().as_str() == subject)
    }

    /// Skipped and failed subjects with a one-line reason each
    pub fn problems(&self) -> impl Iterator<Item = (&SubjectId, String)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            OutcomeStatus::Completed { .. } => None,
            OutcomeStatus::Skipped { stage, reason } => Some((o.subject(), format!("skipped at {stage}: {reason}"))),
            OutcomeStatus::Failed { stage, kind, reason } => {
                Some((o.subject(), format!("failed at {stage} ({kind}): {reason}")))
            }
        })
    }

    pub fn elapsed_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {}: {} subject(s), {} processed, {} skipped, {} failed in {:.1}s",
            self.run_id,
            self.total(),
            self.processed(),
            self.skipped(),
            self.failed(),
            self.elapsed_seconds()
        )?;
        for (subject, reason) in self.problems() {
            writeln!(f, "  {subject}: {reason}")?;
        }
        Ok(())
    }
}
