//! logcast
//!
//! Fachada del workspace: reexporta el núcleo (`logcast-core`) y la
//! implementación Postgres (`logcast-persistence`) para que un cliente
//! dependa de un solo crate.
//!
//! - `core`: modelo, trait `LogBroadcastOrm`, `InMemoryLogOrm`, `LogBroadcaster`.
//! - `persistence`: `PgLogOrm`, pool r2d2, migraciones y configuración.

pub use logcast_core as core;
pub use logcast_persistence as persistence;

pub use logcast_core::{BroadcastRecord, InMemoryLogOrm, ListenerId, LogBroadcastOrm, LogBroadcaster, LogFilter,
                       LogRecord, TrackerError, TrackerResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_exposes_both_stores_behind_one_trait() {
        fn assert_orm<O: LogBroadcastOrm>() {}
        assert_orm::<InMemoryLogOrm>();
        assert_orm::<persistence::PgLogOrm<persistence::PoolProvider>>();
    }
}
