use alloy_primitives::{Address, B256};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::upsert::excluded;
use log::{debug, error, warn};
use logcast_core::{BroadcastRecord, ListenerId, LogBroadcastOrm, LogFilter, LogRecord, TrackerError, TrackerResult};

use super::rows::{to_db_bound, to_db_int, BroadcastRow, LogRow, NewBroadcastRow, NewLogRow};
use super::ConnectionProvider;
use crate::error::PersistenceError;
use crate::schema::{eth_logs, log_broadcasts};

// Un log entra al backlog si tiene al menos un broadcast (JOIN interno) y
// ninguno consumido.
const UNCONSUMED_PRIOR_TO_BLOCK: &str = r#"
    SELECT eth_logs.* FROM eth_logs
    JOIN log_broadcasts
      ON eth_logs.block_hash = log_broadcasts.block_hash
     AND eth_logs.log_index = log_broadcasts.log_index
    WHERE eth_logs.block_number < $1
    GROUP BY eth_logs.block_hash, eth_logs.log_index
    HAVING bool_or(log_broadcasts.consumed) = false
    ORDER BY eth_logs.order_received, eth_logs.block_number, eth_logs.log_index ASC
"#;

/// Implementación Postgres de `LogBroadcastOrm`.
pub struct PgLogOrm<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgLogOrm<P> {
    /// Crea un `PgLogOrm` a partir de un `ConnectionProvider` (generalmente
    /// `PoolProvider`).
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn upsert_log_on(conn: &mut PgConnection, log: &LogRecord) -> Result<(), PersistenceError> {
    let row = NewLogRow::from_log(log)?;
    diesel::insert_into(eth_logs::table).values(&row)
                                        .on_conflict((eth_logs::block_hash, eth_logs::log_index))
                                        .do_update()
                                        .set((eth_logs::block_number.eq(excluded(eth_logs::block_number)),
                                              eth_logs::address.eq(excluded(eth_logs::address)),
                                              eth_logs::topics.eq(excluded(eth_logs::topics)),
                                              eth_logs::data.eq(excluded(eth_logs::data)),
                                              eth_logs::removed.eq(excluded(eth_logs::removed))))
                                        .execute(conn)?;
    Ok(())
}

fn fetch_logs_on(conn: &mut PgConnection, filter: &LogFilter) -> Result<Vec<LogRecord>, PersistenceError> {
    let mut query = eth_logs::table.select(LogRow::as_select()).into_boxed();
    if let Some(from) = filter.from_block {
        query = query.filter(eth_logs::block_number.ge(to_db_bound(from)));
    }
    if let Some(before) = filter.before_block {
        query = query.filter(eth_logs::block_number.lt(to_db_bound(before)));
    }
    if let Some(address) = filter.address {
        query = query.filter(eth_logs::address.eq(address.to_vec()));
    }
    let rows: Vec<LogRow> = query.order((eth_logs::order_received.asc(),
                                         eth_logs::block_number.asc(),
                                         eth_logs::log_index.asc()))
                                 .load(conn)?;
    rows.into_iter().map(LogRecord::try_from).collect()
}

/// Logs de `address` desde `from_block`, tomados `FOR SHARE` hasta el fin de
/// la transacción. Un borrado concurrente espera, y un log ya borrado por una
/// transacción confirmada no se devuelve.
fn lock_logs_since_on(conn: &mut PgConnection, from_block: u64, address: Address) -> Result<Vec<LogRecord>, PersistenceError> {
    let rows: Vec<LogRow> = eth_logs::table.select(LogRow::as_select())
                                           .filter(eth_logs::block_number.ge(to_db_bound(from_block)))
                                           .filter(eth_logs::address.eq(address.to_vec()))
                                           .order((eth_logs::order_received.asc(),
                                                   eth_logs::block_number.asc(),
                                                   eth_logs::log_index.asc()))
                                           .for_share()
                                           .load(conn)?;
    rows.into_iter().map(LogRecord::try_from).collect()
}

/// Upsert de broadcast. En conflicto se refrescan identidad y `block_number`;
/// `consumed` no figura en el SET.
fn upsert_broadcast_on(conn: &mut PgConnection, log: &LogRecord, listener: ListenerId) -> Result<(), PersistenceError> {
    let row = NewBroadcastRow::unconsumed(log, listener)?;
    let insert = diesel::insert_into(log_broadcasts::table).values(&row);
    let refresh = (log_broadcasts::block_hash.eq(excluded(log_broadcasts::block_hash)),
                   log_broadcasts::block_number.eq(excluded(log_broadcasts::block_number)),
                   log_broadcasts::log_index.eq(excluded(log_broadcasts::log_index)),
                   log_broadcasts::job_id.eq(excluded(log_broadcasts::job_id)),
                   log_broadcasts::job_id_v2.eq(excluded(log_broadcasts::job_id_v2)));
    match listener {
        ListenerId::Legacy(_) => insert.on_conflict((log_broadcasts::job_id,
                                                     log_broadcasts::block_hash,
                                                     log_broadcasts::log_index))
                                       .do_update()
                                       .set(refresh)
                                       .execute(conn)?,
        ListenerId::Modern(_) => insert.on_conflict((log_broadcasts::job_id_v2,
                                                     log_broadcasts::block_hash,
                                                     log_broadcasts::log_index))
                                       .do_update()
                                       .set(refresh)
                                       .execute(conn)?,
    };
    Ok(())
}

impl<P: ConnectionProvider> LogBroadcastOrm for PgLogOrm<P> {
    fn upsert_log(&self, log: &LogRecord) -> TrackerResult<()> {
        debug!("upsert_log block_hash={} log_index={} block_number={}",
               log.block_hash, log.log_index, log.block_number);
        let mut conn = self.provider.connection()?;
        upsert_log_on(&mut conn, log)?;
        Ok(())
    }

    fn fetch_logs(&self, filter: &LogFilter) -> TrackerResult<Vec<LogRecord>> {
        let mut conn = self.provider.connection()?;
        let logs = fetch_logs_on(&mut conn, filter)?;
        debug!("fetch_logs filter={filter:?} count={}", logs.len());
        Ok(logs)
    }

    fn delete_log_and_broadcasts(&self, block_hash: B256, log_index: u64) -> TrackerResult<()> {
        let index = to_db_int(log_index)?;
        let mut conn = self.provider.connection()?;
        // El log se borra primero: su lock de fila espera a cualquier backfill
        // que lo tenga FOR SHARE, y el DELETE de broadcasts posterior ya ve
        // las filas que ese backfill confirmó.
        let (logs, broadcasts) = conn.build_transaction()
                                     .read_write()
                                     .run(|tx| {
                                         let logs = diesel::delete(eth_logs::table.filter(eth_logs::block_hash.eq(block_hash.to_vec()))
                                                                                  .filter(eth_logs::log_index.eq(index)))
                                                        .execute(tx)?;
                                         let broadcasts =
                                             diesel::delete(log_broadcasts::table.filter(log_broadcasts::block_hash.eq(block_hash.to_vec()))
                                                                                 .filter(log_broadcasts::log_index.eq(index)))
                                                 .execute(tx)?;
                                         Ok::<_, PersistenceError>((logs, broadcasts))
                                     })?;
        debug!("delete_log_and_broadcasts block_hash={block_hash} log_index={log_index} logs={logs} broadcasts={broadcasts}");
        Ok(())
    }

    fn register_broadcast(&self, log: &LogRecord, listener: ListenerId) -> TrackerResult<()> {
        debug!("register_broadcast block_hash={} log_index={} listener={listener}",
               log.block_hash, log.log_index);
        let mut conn = self.provider.connection()?;
        upsert_broadcast_on(&mut conn, log, listener)?;
        Ok(())
    }

    fn register_broadcasts_since_block(&self,
                                       block_number: u64,
                                       address: Address,
                                       listener: ListenerId)
                                       -> TrackerResult<()> {
        let mut conn = self.provider.connection()?;
        // Todo o nada: un fallo a mitad no deja backlog parcial.
        let count = conn.build_transaction()
                        .read_write()
                        .run(|tx| {
                            let logs = lock_logs_since_on(tx, block_number, address)?;
                            for log in &logs {
                                upsert_broadcast_on(tx, log, listener)?;
                            }
                            Ok::<_, PersistenceError>(logs.len())
                        })?;
        debug!("register_broadcasts_since_block from={block_number} address={address} listener={listener} count={count}");
        Ok(())
    }

    fn was_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<Option<bool>> {
        let mut conn = self.provider.connection()?;
        let mut query = log_broadcasts::table.select(log_broadcasts::consumed)
                                             .filter(log_broadcasts::block_hash.eq(block_hash.to_vec()))
                                             .filter(log_broadcasts::log_index.eq(to_db_int(log_index)?))
                                             .into_boxed();
        query = match listener {
            ListenerId::Legacy(job) => query.filter(log_broadcasts::job_id.eq(job.0))
                                            .filter(log_broadcasts::job_id_v2.is_null()),
            ListenerId::Modern(job) => query.filter(log_broadcasts::job_id_v2.eq(job))
                                            .filter(log_broadcasts::job_id.is_null()),
        };
        let consumed = query.first::<bool>(&mut conn)
                            .optional()
                            .map_err(PersistenceError::from)?;
        Ok(consumed)
    }

    fn mark_consumed(&self, block_hash: B256, log_index: u64, listener: ListenerId) -> TrackerResult<()> {
        let index = to_db_int(log_index)?;
        let mut conn = self.provider.connection()?;
        let target = log_broadcasts::table.filter(log_broadcasts::block_hash.eq(block_hash.to_vec()))
                                          .filter(log_broadcasts::log_index.eq(index));
        let affected = match listener {
            ListenerId::Legacy(job) => {
                diesel::update(target.filter(log_broadcasts::job_id.eq(job.0))
                                     .filter(log_broadcasts::job_id_v2.is_null()))
                    .set(log_broadcasts::consumed.eq(true))
                    .execute(&mut conn)
            }
            ListenerId::Modern(job) => {
                diesel::update(target.filter(log_broadcasts::job_id_v2.eq(job))
                                     .filter(log_broadcasts::job_id.is_null()))
                    .set(log_broadcasts::consumed.eq(true))
                    .execute(&mut conn)
            }
        }.map_err(PersistenceError::from)?;
        if affected == 0 {
            warn!("mark_consumed: no broadcast block_hash={block_hash} log_index={log_index} listener={listener}");
            return Err(TrackerError::NotFound { block_hash, log_index, listener });
        }
        Ok(())
    }

    fn unconsumed_prior_to_block(&self, block_number: u64) -> TrackerResult<Vec<LogRecord>> {
        let mut conn = self.provider.connection()?;
        let rows: Vec<LogRow> = diesel::sql_query(UNCONSUMED_PRIOR_TO_BLOCK).bind::<BigInt, _>(to_db_bound(block_number))
                                                                           .load(&mut conn)
                                                                           .map_err(|e| {
                                                                               error!("could not fetch logs to broadcast: {e}");
                                                                               PersistenceError::from(e)
                                                                           })?;
        let logs = rows.into_iter()
                       .map(LogRecord::try_from)
                       .collect::<Result<Vec<_>, _>>()?;
        debug!("unconsumed_prior_to_block block_number={block_number} count={}", logs.len());
        Ok(logs)
    }

    fn purge_unconsumed_for_listener(&self, listener: ListenerId) -> TrackerResult<()> {
        let mut conn = self.provider.connection()?;
        let unconsumed = log_broadcasts::table.filter(log_broadcasts::consumed.eq(false));
        let removed = match listener {
            ListenerId::Legacy(job) => {
                diesel::delete(unconsumed.filter(log_broadcasts::job_id.eq(job.0))
                                         .filter(log_broadcasts::job_id_v2.is_null()))
                    .execute(&mut conn)
            }
            ListenerId::Modern(job) => {
                diesel::delete(unconsumed.filter(log_broadcasts::job_id_v2.eq(job))
                                         .filter(log_broadcasts::job_id.is_null()))
                    .execute(&mut conn)
            }
        }.map_err(PersistenceError::from)?;
        debug!("purge_unconsumed_for_listener listener={listener} removed={removed}");
        Ok(())
    }

    fn broadcasts_for_log(&self, block_hash: B256, log_index: u64) -> TrackerResult<Vec<BroadcastRecord>> {
        let mut conn = self.provider.connection()?;
        let rows: Vec<BroadcastRow> =
            log_broadcasts::table.select(BroadcastRow::as_select())
                                 .filter(log_broadcasts::block_hash.eq(block_hash.to_vec()))
                                 .filter(log_broadcasts::log_index.eq(to_db_int(log_index)?))
                                 // legacy primero (job_id no nulo), igual que el orden de ListenerId
                                 .order((log_broadcasts::job_id.asc(), log_broadcasts::job_id_v2.asc()))
                                 .load(&mut conn)
                                 .map_err(PersistenceError::from)?;
        let records = rows.into_iter()
                          .map(BroadcastRecord::try_from)
                          .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
