//! Input Validation
//!
//! Provides range checking and identifier validation for feature bins and
//! anomaly events before they reach the scoring and correlation stages.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidationConfig, Validator};
