use thiserror::Error;

use crate::core::CollectionKind;

pub type DashResult<T> = Result<T, DashError>;

#[derive(Debug, Error)]
pub enum DashError {
    #[error("no data available")]
    NoData,

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("no {kind} row matches key {row_key}")]
    ReconciliationNotFound {
        kind: CollectionKind,
        row_key: String,
    },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
