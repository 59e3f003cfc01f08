//! Shared primitive types used across the entire engine.

/// Stable identifier of an ingested transaction.
pub type TransactionId = String;

/// Stable identifier of the account a transaction belongs to.
pub type AccountId = String;

/// Identifier of a configured rule. Rules are evaluated in ascending id order.
pub type RuleId = String;

pub type AlertId = String;

pub type CaseId = String;

/// Point in time with the originating local offset preserved.
pub type Timestamp = chrono::DateTime<chrono::FixedOffset>;
