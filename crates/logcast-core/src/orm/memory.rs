use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::{Address, B256};
use chrono::Utc;
use log::{debug, warn};

use super::LogBroadcastOrm;
use crate::errors::{TrackerError, TrackerResult};
use crate::model::{BroadcastRecord, ListenerId, LogFilter, LogKey, LogRecord};

struct StoredLog {
    log: LogRecord,
    order_received: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BroadcastKey {
    listener: ListenerId,
    log: LogKey,
}

#[derive(Default)]
struct State {
    logs: HashMap<LogKey, StoredLog>,
    broadcasts: HashMap<BroadcastKey, BroadcastRecord>,
    next_order: u64,
}

impl State {
    fn upsert_log(&mut self, log: &LogRecord) {
        let key = log.key();
        match self.logs.get_mut(&key) {
            Some(stored) => stored.log = log.clone(),
            None => {
                self.next_order += 1;
                self.logs.insert(key,
                                 StoredLog { log: log.clone(),
                                             order_received: self.next_order });
            }
        }
    }

    /// Filas ordenadas canónicamente que cumplen `pred`.
    fn select_logs<F>(&self, pred: F) -> Vec<LogRecord>
        where F: Fn(&StoredLog) -> bool
    {
        let mut rows: Vec<&StoredLog> = self.logs.values().filter(|s| pred(s)).collect();
        rows.sort_by_key(|s| (s.order_received, s.log.block_number, s.log.log_index));
        rows.into_iter().map(|s| s.log.clone()).collect()
    }

    fn register(&mut self, log: &LogRecord, listener: ListenerId) {
        let key = BroadcastKey { listener, log: log.key() };
        self.broadcasts
            .entry(key)
            .and_modify(|row| {
                // consumed queda intacto
                row.block_hash = log.block_hash;
                row.block_number = log.block_number;
                row.log_index = log.log_index;
                row.listener = listener;
            })
            .or_insert_with(|| BroadcastRecord { block_hash: log.block_hash,
                                                 block_number: log.block_number,
                                                 log_index: log.log_index,
                                                 listener,
                                                 consumed: false,
                                                 created_at: Utc::now() });
    }
}

/// Implementación en memoria de `LogBroadcastOrm`.
///
/// Todo el estado vive tras un único `Mutex`: cada operación toma el lock una
/// vez, lo que la hace atómica respecto a las demás (equivalente a una
/// transacción serializable). Pensada para tests y prototipos.
#[derive(Default)]
pub struct InMemoryLogOrm {
    state: Mutex<State>,
}

impl InMemoryLogOrm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TrackerResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| TrackerError::Store("in-memory log store lock poisoned".into()))
    }
}

impl LogBroadcastOrm for InMemoryLogOrm {
    fn upsert_log(&self, log: &LogRecord) -> TrackerResult<()> {
        debug!("upsert_log block_hash={} log_index={} block_number={}",
               log.block_hash, log.log_index, log.block_number);
        self.lock()?.upsert_log(log);
        Ok(())
    }

    fn fetch_logs(&self, filter: &LogFilter) -> TrackerResult<Vec<LogRecord>> {
        let logs = self.lock()?.select_logs(|s| filter.matches(&s.log));
        debug!("fetch_logs filter={filter:?} count={}", logs.len());
        Ok(logs)
    }

    fn delete_log_and_broadcasts(&self, block_hash: B256, log_index: u64) -> TrackerResult<()> {
        let key = LogKey::new(block_hash, log_index);
        let mut state = self.lock()?;
        state.logs.remove(&key);
        let before = state.broadcasts.len();
        state.broadcasts.retain(|k, _| k.log != key);
        debug!("delete_log_and_broadcasts block_hash={block_hash} log_index={log_index} broadcasts_removed={}",
               before - state.broadcasts.len());
        Ok(())
    }

    fn register_broadcast(&self, log: &LogRecord, listener: ListenerId) -> TrackerResult<()> {
        debug!("register_broadcast block_hash={} log_index={} listener={listener}",
               log.block_hash, log.log_index);
        self.lock()?.register(log, listener);
        Ok(())
    }

    fn register_broadcasts_since_block(&self,
                                       block_number: u64,
                                       address: Address,
                                       listener: ListenerId)
                                       -> TrackerResult<()> {
        let filter = LogFilter::default().from_block(block_number).address(address);
        let mut state = self.lock()?;
        let logs = state.select_logs(|s| filter.matches(&s.log));
        for log in &logs {
            state.register(log, listener);
        }
        debug!("register_broadcasts_since_block from={block_number} address={address} listener={listener} count={}",
               logs.len());
        Ok(())
    }

    fn was_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<Option<bool>> {
        let key = BroadcastKey { listener, log: LogKey::new(block_hash, log_index) };
        Ok(self.lock()?.broadcasts.get(&key).map(|row| row.consumed))
    }

    fn mark_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<()> {
        let key = BroadcastKey { listener, log: LogKey::new(block_hash, log_index) };
        match self.lock()?.broadcasts.get_mut(&key) {
            Some(row) => {
                row.consumed = true;
                Ok(())
            }
            None => {
                warn!("mark_consumed: no broadcast block_hash={block_hash} log_index={log_index} listener={listener}");
                Err(TrackerError::NotFound { block_hash, log_index, listener })
            }
        }
    }

    fn unconsumed_prior_to_block(&self, block_number: u64) -> TrackerResult<Vec<LogRecord>> {
        let state = self.lock()?;
        // log -> algún broadcast consumido
        let mut any_consumed: HashMap<LogKey, bool> = HashMap::new();
        for (key, row) in &state.broadcasts {
            *any_consumed.entry(key.log).or_insert(false) |= row.consumed;
        }
        let logs = state.select_logs(|s| {
                            s.log.block_number < block_number
                            && any_consumed.get(&s.log.key()) == Some(&false)
                        });
        debug!("unconsumed_prior_to_block block_number={block_number} count={}", logs.len());
        Ok(logs)
    }

    fn purge_unconsumed_for_listener(&self, listener: ListenerId) -> TrackerResult<()> {
        let mut state = self.lock()?;
        let before = state.broadcasts.len();
        state.broadcasts
             .retain(|k, row| k.listener != listener || row.consumed);
        debug!("purge_unconsumed_for_listener listener={listener} removed={}",
               before - state.broadcasts.len());
        Ok(())
    }

    fn broadcasts_for_log(&self, block_hash: B256, log_index: u64) -> TrackerResult<Vec<BroadcastRecord>> {
        let key = LogKey::new(block_hash, log_index);
        let mut rows: Vec<BroadcastRecord> = self.lock()?
                                                 .broadcasts
                                                 .values()
                                                 .filter(|row| row.log_key() == key)
                                                 .cloned()
                                                 .collect();
        rows.sort_by_key(|row| row.listener);
        Ok(rows)
    }
}
