//! Trait `LogBroadcastOrm`: contrato del Log Store + Broadcast Ledger.
//!
//! Cada operación es una unidad de trabajo acotada contra el store durable:
//! bloqueante, atómica y segura frente a invocaciones concurrentes de
//! listeners distintos y del camino de ingesta. Ninguna implementación
//! reintenta internamente; la política de reintentos es del llamador (ver
//! `TrackerError::is_transient`).
//!
//! Orden canónico de lectura: `(order_received, block_number, log_index)`
//! ascendente, donde `order_received` se asigna en la primera inserción del
//! log y se conserva en sobrescrituras posteriores.

mod memory;

use std::sync::Arc;

use alloy_primitives::{Address, B256};

use crate::errors::TrackerResult;
use crate::model::{BroadcastRecord, ListenerId, LogFilter, LogRecord};

pub use memory::InMemoryLogOrm;

pub trait LogBroadcastOrm: Send + Sync {
    /// Inserta el log o, si `(block_hash, log_index)` ya existe, sobrescribe
    /// sus campos mutables. Un conflicto no es un error.
    fn upsert_log(&self, log: &LogRecord) -> TrackerResult<()>;

    /// Logs que cumplen `filter`, en orden canónico.
    fn fetch_logs(&self, filter: &LogFilter) -> TrackerResult<Vec<LogRecord>>;

    /// Elimina el log y todos sus broadcasts en una misma transacción.
    fn delete_log_and_broadcasts(&self, block_hash: B256, log_index: u64) -> TrackerResult<()>;

    /// Registra el interés de `listener` en `log`. La primera inserción nace
    /// con `consumed = false`; re-registrar refresca la fila pero nunca toca
    /// `consumed`.
    fn register_broadcast(&self, log: &LogRecord, listener: ListenerId) -> TrackerResult<()>;

    /// Backfill: registra `listener` para todo log de `address` con
    /// `block_number >= block_number`, todo o nada.
    fn register_broadcasts_since_block(&self,
                                       block_number: u64,
                                       address: Address,
                                       listener: ListenerId)
                                       -> TrackerResult<()>;

    /// `None` si no hay fila (log nunca difundido a este listener),
    /// `Some(consumed)` en otro caso.
    fn was_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<Option<bool>>;

    /// Marca el broadcast como consumido. `TrackerError::NotFound` si no
    /// existe; consumir dos veces no es error.
    fn mark_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<()>;

    /// Logs con `block_number < block_number` que tienen al menos un
    /// broadcast y ninguno consumido, en orden canónico.
    fn unconsumed_prior_to_block(&self, block_number: u64) -> TrackerResult<Vec<LogRecord>>;

    /// Borra los broadcasts no consumidos del listener (sólo su espacio de
    /// identidad). Los consumidos se conservan.
    fn purge_unconsumed_for_listener(&self, listener: ListenerId) -> TrackerResult<()>;

    /// Broadcasts registrados para un log, ordenados por listener.
    fn broadcasts_for_log(&self, block_hash: B256, log_index: u64) -> TrackerResult<Vec<BroadcastRecord>>;
}

impl<T: LogBroadcastOrm + ?Sized> LogBroadcastOrm for Arc<T> {
    fn upsert_log(&self, log: &LogRecord) -> TrackerResult<()> {
        (**self).upsert_log(log)
    }
    fn fetch_logs(&self, filter: &LogFilter) -> TrackerResult<Vec<LogRecord>> {
        (**self).fetch_logs(filter)
    }
    fn delete_log_and_broadcasts(&self, block_hash: B256, log_index: u64) -> TrackerResult<()> {
        (**self).delete_log_and_broadcasts(block_hash, log_index)
    }
    fn register_broadcast(&self, log: &LogRecord, listener: ListenerId) -> TrackerResult<()> {
        (**self).register_broadcast(log, listener)
    }
    fn register_broadcasts_since_block(&self,
                                       block_number: u64,
                                       address: Address,
                                       listener: ListenerId)
                                       -> TrackerResult<()> {
        (**self).register_broadcasts_since_block(block_number, address, listener)
    }
    fn was_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<Option<bool>> {
        (**self).was_consumed(block_hash, log_index, listener)
    }
    fn mark_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<()> {
        (**self).mark_consumed(block_hash, log_index, listener)
    }
    fn unconsumed_prior_to_block(&self, block_number: u64) -> TrackerResult<Vec<LogRecord>> {
        (**self).unconsumed_prior_to_block(block_number)
    }
    fn purge_unconsumed_for_listener(&self, listener: ListenerId) -> TrackerResult<()> {
        (**self).purge_unconsumed_for_listener(listener)
    }
    fn broadcasts_for_log(&self, block_hash: B256, log_index: u64) -> TrackerResult<Vec<BroadcastRecord>> {
        (**self).broadcasts_for_log(block_hash, log_index)
    }
}
