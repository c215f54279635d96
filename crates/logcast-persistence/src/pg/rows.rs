//! Filas Diesel de `eth_logs` / `log_broadcasts` y su mapeo al dominio.
//!
//! Postgres no tiene enteros sin signo: `block_number` y `log_index` viajan
//! como BIGINT y se validan en ambas direcciones.

use alloy_primitives::{Address, Bytes, FixedBytes, B256};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use logcast_core::{BroadcastRecord, ListenerId, LogRecord};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::schema::{eth_logs, log_broadcasts};

/// Fila leída de `eth_logs`. También se usa con `sql_query` (por nombre de
/// columna) en la consulta de backlog.
#[derive(Queryable, QueryableByName, Selectable, Debug)]
#[diesel(table_name = eth_logs, check_for_backend(diesel::pg::Pg))]
pub struct LogRow {
    pub block_hash: Vec<u8>,
    pub log_index: i64,
    pub block_number: i64,
    pub address: Vec<u8>,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
    pub removed: bool,
    pub order_received: i64,
    pub created_at: DateTime<Utc>,
}

/// Inserción en `eth_logs`; `order_received` y `created_at` los asigna la
/// base.
#[derive(Insertable, Debug)]
#[diesel(table_name = eth_logs)]
pub struct NewLogRow {
    pub block_hash: Vec<u8>,
    pub log_index: i64,
    pub block_number: i64,
    pub address: Vec<u8>,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
    pub removed: bool,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = log_broadcasts, check_for_backend(diesel::pg::Pg))]
pub struct BroadcastRow {
    pub id: i64,
    pub block_hash: Vec<u8>,
    pub block_number: i64,
    pub log_index: i64,
    pub job_id: Option<Uuid>,
    pub job_id_v2: Option<i32>,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

/// Inserción en `log_broadcasts`. Exactamente uno de `job_id` / `job_id_v2`
/// es `Some` (lo garantiza `ListenerId::to_columns` y un CHECK en la tabla).
#[derive(Insertable, Debug)]
#[diesel(table_name = log_broadcasts)]
pub struct NewBroadcastRow {
    pub block_hash: Vec<u8>,
    pub block_number: i64,
    pub log_index: i64,
    pub job_id: Option<Uuid>,
    pub job_id_v2: Option<i32>,
    pub consumed: bool,
}

pub fn to_db_int(value: u64) -> Result<i64, PersistenceError> {
    i64::try_from(value).map_err(|_| PersistenceError::Decode(format!("value {value} out of range for BIGINT")))
}

/// Cota superior de rango: satura en `i64::MAX` en vez de fallar.
pub fn to_db_bound(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(column: &str, value: i64) -> Result<u64, PersistenceError> {
    u64::try_from(value).map_err(|_| PersistenceError::Decode(format!("negative {column}: {value}")))
}

fn hash_from(column: &str, bytes: &[u8]) -> Result<B256, PersistenceError> {
    B256::try_from(bytes).map_err(|_| PersistenceError::Decode(format!("{column} has {} bytes, expected 32", bytes.len())))
}

fn address_from(bytes: &[u8]) -> Result<Address, PersistenceError> {
    FixedBytes::<20>::try_from(bytes).map(Address::from)
                                     .map_err(|_| PersistenceError::Decode(format!("address has {} bytes, expected 20", bytes.len())))
}

impl NewLogRow {
    pub fn from_log(log: &LogRecord) -> Result<Self, PersistenceError> {
        Ok(Self { block_hash: log.block_hash.to_vec(),
                  log_index: to_db_int(log.log_index)?,
                  block_number: to_db_int(log.block_number)?,
                  address: log.address.to_vec(),
                  topics: log.topics.iter().map(|t| t.to_vec()).collect(),
                  data: log.data.to_vec(),
                  removed: log.removed })
    }
}

impl NewBroadcastRow {
    pub fn unconsumed(log: &LogRecord, listener: ListenerId) -> Result<Self, PersistenceError> {
        let (job_id, job_id_v2) = listener.to_columns();
        Ok(Self { block_hash: log.block_hash.to_vec(),
                  block_number: to_db_int(log.block_number)?,
                  log_index: to_db_int(log.log_index)?,
                  job_id,
                  job_id_v2,
                  consumed: false })
    }
}

impl TryFrom<LogRow> for LogRecord {
    type Error = PersistenceError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let topics = row.topics
                        .iter()
                        .map(|t| hash_from("topic", t))
                        .collect::<Result<Vec<_>, _>>()?;
        Ok(LogRecord { block_hash: hash_from("block_hash", &row.block_hash)?,
                       block_number: from_db_int("block_number", row.block_number)?,
                       log_index: from_db_int("log_index", row.log_index)?,
                       address: address_from(&row.address)?,
                       topics,
                       data: Bytes::from(row.data),
                       removed: row.removed })
    }
}

impl TryFrom<BroadcastRow> for BroadcastRecord {
    type Error = PersistenceError;

    fn try_from(row: BroadcastRow) -> Result<Self, Self::Error> {
        let listener = ListenerId::from_columns(row.job_id, row.job_id_v2).ok_or_else(|| {
                           PersistenceError::Decode(format!("broadcast {} must have exactly one of job_id/job_id_v2", row.id))
                       })?;
        Ok(BroadcastRecord { block_hash: hash_from("block_hash", &row.block_hash)?,
                             block_number: from_db_int("block_number", row.block_number)?,
                             log_index: from_db_int("log_index", row.log_index)?,
                             listener,
                             consumed: row.consumed,
                             created_at: row.created_at })
    }
}
