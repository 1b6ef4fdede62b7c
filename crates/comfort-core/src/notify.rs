//! Notifications handed to the presentation side

use crate::persistence::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification waiting to be drained by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingUpdate {
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only queue of pending updates, stored as a flat JSON list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingUpdates(pub Vec<PendingUpdate>);

impl PendingUpdates {
    pub fn push(&mut self, update: PendingUpdate) {
        self.0.push(update);
    }

    /// Take every queued update in timestamp order, leaving the queue empty
    pub fn drain(&mut self) -> Vec<PendingUpdate> {
        let mut updates = std::mem::take(&mut self.0);
        updates.sort_by_key(|u| u.timestamp);
        updates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Resource for PendingUpdates {
    const FILE_NAME: &'static str = "pending_updates.json";
}

/// Summary of the latest background update cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: "No status available".to_string(),
        }
    }
}

impl Resource for StatusSnapshot {
    const FILE_NAME: &'static str = "status.json";
}
