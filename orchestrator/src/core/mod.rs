//! Core business logic modules
//!
//! Pure bookkeeping with no I/O: subject selection and run outcomes.

pub mod state;
pub mod subjects;

pub use state::{OutcomeStatus, RunSummary, SkipReason, SubjectOutcome};
pub use subjects::SubjectSelection;
