//! Errores del tracker de consumo.

use alloy_primitives::B256;
use thiserror::Error;

use crate::model::ListenerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// Se intentó consumir un broadcast que nunca fue registrado. Indica un
    /// problema de orden registro/consumo aguas arriba.
    #[error("cannot mark log broadcast as consumed: does not exist (block_hash={block_hash}, log_index={log_index}, listener={listener})")]
    NotFound {
        block_hash: B256,
        log_index: u64,
        listener: ListenerId,
    },
    /// Store no disponible, conflicto de serialización o timeout. Reintentable
    /// por el llamador.
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store error: {0}")]
    Store(String),
}

impl TrackerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
