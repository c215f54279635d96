//! Coordinador de ingesta: conecta el Log Source con el tracker.
//!
//! Flujo: `ingest` -> `upsert_log` -> `register_broadcast` por cada listener
//! suscrito a la dirección emisora. Un log marcado `removed` por el Log Source
//! se invalida con `delete_log_and_broadcasts`. La profundidad del reorg la
//! decide siempre el llamador; aquí sólo se aplica lo que llega.
//!
//! Exclusión: la ingesta de un log vivo corre bajo el lock de lectura de las
//! suscripciones; `subscribe`, `unsubscribe` y la ingesta de un log removido
//! toman el de escritura. Ningún listener retirado recibe filas nuevas y
//! ningún borrado por reorg se intercala entre `upsert_log` y sus
//! registros. Cada sección crítica cubre sólo operaciones acotadas del store.
use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::Address;
use log::debug;

use crate::errors::{TrackerError, TrackerResult};
use crate::model::{ListenerId, LogRecord};
use crate::orm::LogBroadcastOrm;

type Subscriptions = HashMap<Address, BTreeSet<ListenerId>>;

/// Suscripciones por dirección emisora + store inyectado.
pub struct LogBroadcaster<O: LogBroadcastOrm> {
    orm: O,
    subscriptions: RwLock<Subscriptions>,
}

impl<O: LogBroadcastOrm> LogBroadcaster<O> {
    pub fn new(orm: O) -> Self {
        Self { orm, subscriptions: RwLock::new(HashMap::new()) }
    }

    pub fn orm(&self) -> &O {
        &self.orm
    }

    fn read_subs(&self) -> TrackerResult<RwLockReadGuard<'_, Subscriptions>> {
        self.subscriptions
            .read()
            .map_err(|_| TrackerError::Store("subscriptions lock poisoned".into()))
    }

    fn write_subs(&self) -> TrackerResult<RwLockWriteGuard<'_, Subscriptions>> {
        self.subscriptions
            .write()
            .map_err(|_| TrackerError::Store("subscriptions lock poisoned".into()))
    }

    /// Suscribe `listener` a `address` y hace backfill desde `from_block`.
    ///
    /// El backfill corre con el lock de escritura tomado: un log ingerido en
    /// paralelo queda antes (y lo cubre el backfill) o después (y lo registra
    /// `ingest`).
    pub fn subscribe(&self, listener: ListenerId, address: Address, from_block: u64) -> TrackerResult<()> {
        let mut subs = self.write_subs()?;
        debug!("subscribe listener={listener} address={address} from_block={from_block}");
        self.orm.register_broadcasts_since_block(from_block, address, listener)?;
        subs.entry(address).or_default().insert(listener);
        Ok(())
    }

    /// Retira `listener` de todas las direcciones y purga su backlog no
    /// consumido.
    pub fn unsubscribe(&self, listener: ListenerId) -> TrackerResult<()> {
        let mut subs = self.write_subs()?;
        for listeners in subs.values_mut() {
            listeners.remove(&listener);
        }
        subs.retain(|_, listeners| !listeners.is_empty());
        debug!("unsubscribe listener={listener}");
        self.orm.purge_unconsumed_for_listener(listener)
    }

    pub fn listeners_for(&self, address: Address) -> TrackerResult<Vec<ListenerId>> {
        Ok(listeners_in(&*self.read_subs()?, address))
    }

    /// Aplica un log del Log Source. Devuelve los listeners para los que quedó
    /// registrado (vacío si el log venía `removed`).
    pub fn ingest(&self, log: &LogRecord) -> TrackerResult<Vec<ListenerId>> {
        if log.removed {
            let _subs = self.write_subs()?;
            debug!("ingest: removed log block_hash={} log_index={}", log.block_hash, log.log_index);
            self.orm.delete_log_and_broadcasts(log.block_hash, log.log_index)?;
            return Ok(vec![]);
        }
        let subs = self.read_subs()?;
        self.orm.upsert_log(log)?;
        let listeners = listeners_in(&subs, log.address);
        for listener in &listeners {
            self.orm.register_broadcast(log, *listener)?;
        }
        debug!("ingest block_hash={} log_index={} listeners={}",
               log.block_hash,
               log.log_index,
               listeners.len());
        Ok(listeners)
    }

    /// Backlog global pendiente anterior a `before_block`.
    pub fn backlog(&self, before_block: u64) -> TrackerResult<Vec<LogRecord>> {
        self.orm.unconsumed_prior_to_block(before_block)
    }
}

fn listeners_in(subs: &Subscriptions, address: Address) -> Vec<ListenerId> {
    subs.get(&address)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
}
