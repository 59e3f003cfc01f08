use crate::types::{AccountId, AlertId, CaseId, Timestamp, TransactionId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A feature needs account history that does not exist yet.
    /// Absorbed by the feature extractor; never escapes a scoring call.
    #[error("Insufficient history for feature '{feature}'")]
    InsufficientHistory { feature: &'static str },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Case '{case_id}' cannot be resolved: alerts still pending {pending:?}")]
    PrematureResolution { case_id: CaseId, pending: Vec<AlertId> },

    #[error("Invalid transition for {entity} '{id}': {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error(
        "Out-of-order transaction for account '{account_id}': {received} is older than {last_seen}"
    )]
    OutOfOrder {
        account_id: AccountId,
        last_seen: Timestamp,
        received: Timestamp,
    },

    #[error("Transaction '{transaction_id}' was already scored for account '{account_id}'")]
    DuplicateTransaction {
        account_id: AccountId,
        transaction_id: TransactionId,
    },

    #[error("Alert '{alert_id}' not found")]
    UnknownAlert { alert_id: AlertId },

    #[error("Case '{case_id}' not found")]
    UnknownCase { case_id: CaseId },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { reason: reason.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
