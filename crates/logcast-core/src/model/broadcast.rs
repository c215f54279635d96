//! Registro de interés y consumo de un listener sobre un log.
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ListenerId, LogKey};

/// Fila del ledger de broadcasts.
///
/// Invariantes:
/// - Como mucho una fila por `(listener, block_hash, log_index)`.
/// - `consumed` sólo transiciona de `false` a `true`.
/// - `block_number` es copia desnormalizada del log para filtrar por rango.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    pub block_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub listener: ListenerId,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl BroadcastRecord {
    pub fn log_key(&self) -> LogKey {
        LogKey::new(self.block_hash, self.log_index)
    }
}
