//! Flujo completo: Log Source -> LogBroadcaster -> listeners, incluyendo
//! reorgs, sobre el store en memoria y (si hay DATABASE_URL) sobre Postgres.

use alloy_primitives::{Address, Bytes, B256};
use logcast::persistence::{build_dev_pool_from_env, PgLogOrm, PoolProvider};
use logcast::{InMemoryLogOrm, ListenerId, LogBroadcastOrm, LogBroadcaster, LogFilter, LogRecord};
use uuid::Uuid;

fn log(address: Address, block_number: u64, log_index: u64) -> LogRecord {
    LogRecord { block_hash: B256::left_padding_from(Uuid::new_v4().as_bytes()),
                block_number,
                log_index,
                address,
                topics: vec![B256::repeat_byte(0x01)],
                data: Bytes::from_static(b"payload"),
                removed: false }
}

/// Escenario compartido. Usa dirección y listeners propios; el backlog se
/// filtra por dirección porque la base puede ser compartida.
fn consume_then_reorg<O: LogBroadcastOrm>(broadcaster: &LogBroadcaster<O>) {
    let address = Address::left_padding_from(Uuid::new_v4().as_bytes());
    let early = log(address, 10, 0);
    broadcaster.ingest(&early).unwrap();

    // Suscripción tardía: el backfill cubre el log ya ingerido.
    let a = ListenerId::modern((Uuid::new_v4().as_u128() & 0x7fff_ffff) as i32);
    let b = ListenerId::legacy(Uuid::new_v4());
    broadcaster.subscribe(a, address, 0).unwrap();
    broadcaster.subscribe(b, address, 11).unwrap();

    let next = log(address, 11, 0);
    let mut registered = broadcaster.ingest(&next).unwrap();
    registered.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(registered, expected);

    let orm = broadcaster.orm();
    let mine = |before| -> Vec<LogRecord> {
        broadcaster.backlog(before)
                   .unwrap()
                   .into_iter()
                   .filter(|l| l.address == address)
                   .collect()
    };
    assert_eq!(mine(12), vec![early.clone(), next.clone()]);

    orm.mark_consumed(early.block_hash, early.log_index, a).unwrap();
    assert_eq!(mine(12), vec![next.clone()]);
    assert_eq!(orm.was_consumed(early.block_hash, 0, b).unwrap(), None);

    // Reorg: el Log Source re-entrega `next` como removido.
    let mut reverted = next.clone();
    reverted.removed = true;
    assert!(broadcaster.ingest(&reverted).unwrap().is_empty());
    assert_eq!(orm.was_consumed(next.block_hash, 0, a).unwrap(), None);
    assert_eq!(orm.fetch_logs(&LogFilter::default().address(address)).unwrap(), vec![early.clone()]);

    // Bloque de reemplazo en la misma altura.
    let replacement = log(address, 11, 0);
    broadcaster.ingest(&replacement).unwrap();
    assert_eq!(mine(12), vec![replacement.clone()]);

    broadcaster.unsubscribe(b).unwrap();
    assert_eq!(orm.was_consumed(replacement.block_hash, 0, b).unwrap(), None);
    assert_eq!(orm.was_consumed(replacement.block_hash, 0, a).unwrap(), Some(false));
    assert_eq!(orm.was_consumed(early.block_hash, 0, a).unwrap(), Some(true));
}

#[test]
fn in_memory_consume_then_reorg() {
    consume_then_reorg(&LogBroadcaster::new(InMemoryLogOrm::new()));
}

#[test]
fn postgres_consume_then_reorg() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return;
    }
    let pool = build_dev_pool_from_env().expect("pool");
    consume_then_reorg(&LogBroadcaster::new(PgLogOrm::new(PoolProvider { pool })));
}

#[test]
fn backlog_serializes_as_json_lines() {
    let broadcaster = LogBroadcaster::new(InMemoryLogOrm::new());
    let address = Address::repeat_byte(0x42);
    broadcaster.subscribe(ListenerId::modern(1), address, 0).unwrap();
    let l = log(address, 5, 2);
    broadcaster.ingest(&l).unwrap();

    let line = serde_json::to_string(&broadcaster.backlog(6).unwrap()[0]).unwrap();
    let back: LogRecord = serde_json::from_str(&line).unwrap();
    assert_eq!(back, l);
}
