//! Error types for signal dispatch

use thiserror::Error;

use crate::signal::SubscriberId;

pub type SignalResult<T = ()> = Result<T, SignalError>;

#[derive(Error, Debug)]
pub enum SignalError {
    /// A subscriber callback returned an error
    #[error("Subscriber '{id}' failed: {source}")]
    Subscriber {
        id: SubscriberId,
        #[source]
        source: anyhow::Error,
    },
}

impl SignalError {
    /// Id of the subscriber that failed
    pub fn subscriber(&self) -> &SubscriberId {
        match self {
            SignalError::Subscriber { id, .. } => id,
        }
    }
}
