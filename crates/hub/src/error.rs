//! Engine-level error taxonomy. None of these ever cancel a registered
//! job: only explicit remove/reset changes a job's existence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed schedule rejected at add time, never registered.
    #[error("invalid schedule '{id}': {reason}")]
    InvalidSchedule { id: String, reason: String },

    /// Weather or moisture read failed; the fire resolves to
    /// skip-this-cycle and the schedule keeps running.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] anyhow::Error),

    /// Transport error while publishing a command. Not retried: the next
    /// scheduled fire is the recovery point.
    #[error("dispatch failed: {0}")]
    DispatchFailure(#[from] rumqttc::ClientError),
}
