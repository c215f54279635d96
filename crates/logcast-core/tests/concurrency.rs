//! Listeners concurrentes contra la implementación en memoria.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use logcast_core::{BroadcastRecord, InMemoryLogOrm, ListenerId, LogBroadcastOrm, LogBroadcaster, LogFilter, LogRecord,
                   TrackerResult};
use rayon::prelude::*;

fn log_at(block_number: u64) -> LogRecord {
    LogRecord { block_hash: B256::left_padding_from(&block_number.to_be_bytes()),
                block_number,
                log_index: 0,
                address: Address::repeat_byte(1),
                topics: vec![],
                data: Bytes::new(),
                removed: false }
}

// Escaneos solapados que re-registran mientras otros listeners consumen: ningún
// consumo se pierde.
#[test]
fn concurrent_registration_never_resets_consumption() {
    let orm = Arc::new(InMemoryLogOrm::new());
    let logs: Vec<LogRecord> = (0..200).map(log_at).collect();
    for l in &logs {
        orm.upsert_log(l).unwrap();
    }
    let listeners: Vec<ListenerId> = (0..8).map(ListenerId::modern).collect();
    for listener in &listeners {
        orm.register_broadcasts_since_block(0, Address::repeat_byte(1), *listener).unwrap();
    }

    thread::scope(|s| {
        for listener in &listeners {
            let orm = Arc::clone(&orm);
            let logs = &logs;
            s.spawn(move || {
                for l in logs {
                    orm.mark_consumed(l.block_hash, l.log_index, *listener).unwrap();
                }
            });
        }
        for _ in 0..4 {
            let orm = Arc::clone(&orm);
            let listeners = &listeners;
            s.spawn(move || {
                for listener in listeners {
                    orm.register_broadcasts_since_block(0, Address::repeat_byte(1), *listener).unwrap();
                }
            });
        }
    });

    for l in &logs {
        for listener in &listeners {
            assert_eq!(orm.was_consumed(l.block_hash, l.log_index, *listener).unwrap(), Some(true));
        }
    }
    assert!(orm.unconsumed_prior_to_block(u64::MAX).unwrap().is_empty());
}

#[test]
fn parallel_ingestion_deduplicates_logs() {
    let orm = InMemoryLogOrm::new();
    (0..1_000u64).into_par_iter().for_each(|i| {
                                     let l = log_at(i % 50);
                                     orm.upsert_log(&l).unwrap();
                                     orm.register_broadcast(&l, ListenerId::modern((i % 3) as i32)).unwrap();
                                 });

    let logs = orm.fetch_logs(&Default::default()).unwrap();
    assert_eq!(logs.len(), 50);
    for l in &logs {
        assert_eq!(orm.broadcasts_for_log(l.block_hash, l.log_index).unwrap().len(), 3);
    }
}

/// Store en memoria que avisa al entrar en `register_broadcast` y demora el
/// registro, para abrir la ventana entre el aviso y la escritura.
struct SlowRegistration {
    inner: InMemoryLogOrm,
    entered: Mutex<Option<mpsc::Sender<()>>>,
}

impl SlowRegistration {
    fn new(entered: mpsc::Sender<()>) -> Self {
        Self { inner: InMemoryLogOrm::new(), entered: Mutex::new(Some(entered)) }
    }
}

impl LogBroadcastOrm for SlowRegistration {
    fn upsert_log(&self, log: &LogRecord) -> TrackerResult<()> {
        self.inner.upsert_log(log)
    }
    fn fetch_logs(&self, filter: &LogFilter) -> TrackerResult<Vec<LogRecord>> {
        self.inner.fetch_logs(filter)
    }
    fn delete_log_and_broadcasts(&self, block_hash: B256, log_index: u64) -> TrackerResult<()> {
        self.inner.delete_log_and_broadcasts(block_hash, log_index)
    }
    fn register_broadcast(&self, log: &LogRecord, listener: ListenerId) -> TrackerResult<()> {
        if let Some(tx) = self.entered.lock().unwrap().take() {
            tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
        }
        self.inner.register_broadcast(log, listener)
    }
    fn register_broadcasts_since_block(&self, block_number: u64, address: Address, listener: ListenerId) -> TrackerResult<()> {
        self.inner.register_broadcasts_since_block(block_number, address, listener)
    }
    fn was_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<Option<bool>> {
        self.inner.was_consumed(block_hash, log_index, listener)
    }
    fn mark_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<()> {
        self.inner.mark_consumed(block_hash, log_index, listener)
    }
    fn unconsumed_prior_to_block(&self, block_number: u64) -> TrackerResult<Vec<LogRecord>> {
        self.inner.unconsumed_prior_to_block(block_number)
    }
    fn purge_unconsumed_for_listener(&self, listener: ListenerId) -> TrackerResult<()> {
        self.inner.purge_unconsumed_for_listener(listener)
    }
    fn broadcasts_for_log(&self, block_hash: B256, log_index: u64) -> TrackerResult<Vec<BroadcastRecord>> {
        self.inner.broadcasts_for_log(block_hash, log_index)
    }
}

// Un unsubscribe que llega mientras ingest registra espera a que termine y
// luego purga: no queda backlog para un listener retirado.
#[test]
fn unsubscribe_during_ingest_leaves_no_backlog() {
    let (tx, rx) = mpsc::channel();
    let broadcaster = LogBroadcaster::new(SlowRegistration::new(tx));
    let listener = ListenerId::modern(1);
    broadcaster.subscribe(listener, Address::repeat_byte(1), 0).unwrap();
    let l = log_at(7);

    thread::scope(|s| {
        s.spawn(|| broadcaster.ingest(&l).unwrap());
        let broadcaster = &broadcaster;
        s.spawn(move || {
            rx.recv().unwrap();
            broadcaster.unsubscribe(listener).unwrap();
        });
    });

    assert!(broadcaster.listeners_for(Address::repeat_byte(1)).unwrap().is_empty());
    assert_eq!(broadcaster.orm().was_consumed(l.block_hash, l.log_index, listener).unwrap(), None);
    assert!(broadcaster.backlog(u64::MAX).unwrap().is_empty());
}

// Un reorg del mismo log que llega a mitad de ingest se aplica después del
// registro: no sobrevive ningún broadcast huérfano.
#[test]
fn removal_during_ingest_leaves_no_orphan_broadcast() {
    let (tx, rx) = mpsc::channel();
    let broadcaster = LogBroadcaster::new(SlowRegistration::new(tx));
    let listener = ListenerId::modern(1);
    broadcaster.subscribe(listener, Address::repeat_byte(1), 0).unwrap();
    let l = log_at(7);
    let mut removed = l.clone();
    removed.removed = true;

    thread::scope(|s| {
        s.spawn(|| broadcaster.ingest(&l).unwrap());
        let broadcaster = &broadcaster;
        s.spawn(move || {
            rx.recv().unwrap();
            broadcaster.ingest(&removed).unwrap();
        });
    });

    assert!(broadcaster.orm().fetch_logs(&LogFilter::default()).unwrap().is_empty());
    assert!(broadcaster.orm().broadcasts_for_log(l.block_hash, l.log_index).unwrap().is_empty());
}
