//! Queue status state machine and its serializable snapshot.

use std::fmt;

use serde::Serialize;

/// Processing status of a [`CommitQueue`](super::CommitQueue).
///
/// `Init → InProgress → {Successful, Failed} → InProgress → ...`; there is
/// no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum QueueStatus {
    #[default]
    Init,
    InProgress,
    Failed,
    Successful,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueStatus::Init => "Init",
            QueueStatus::InProgress => "InProgress",
            QueueStatus::Failed => "Failed",
            QueueStatus::Successful => "Successful",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of a queue's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot<T> {
    pub status: QueueStatus,
    pub current: Option<T>,
    pub previous: Option<T>,
    pub last_successful: Option<T>,
    /// Items waiting for dispatch, head first.
    pub pending: Vec<T>,
}
