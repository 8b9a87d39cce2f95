//! Alerting
//!
//! Turns a correlated incident and its triage verdict into an operator alert
//! with root cause, supporting evidence, and remediation steps.

mod assembler;
mod ids;
mod knowledge;

pub use assembler::{Alert, AlertAssembler};
pub use ids::{IdGenerator, SequentialIdGenerator};
pub use knowledge::{
    recommended_actions, root_cause, RecommendedAction, RootCause, RootCauseCategory, SignalFamily,
};
