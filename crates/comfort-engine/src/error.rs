//! Error types for the comfort engine

use comfort_core::StoreError;
use thiserror::Error;

/// Errors that can occur in the comfort engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Writing a shared resource failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A scheduled action with this id is already queued
    #[error("Scheduled action already exists: {0}")]
    DuplicateScheduleId(String),

    /// Invalid time format (expected HH:MM or HH:MM-HH:MM)
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Unknown rule set name
    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    /// No rule with this label for the sensor
    #[error("Rule not found: {sensor}/{label}")]
    RuleNotFound { sensor: String, label: String },

    /// Unknown preset name
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// An intent carried no actions
    #[error("Action batch is empty")]
    EmptyBatch,
}
