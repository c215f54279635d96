//! Implementación Postgres (Diesel) del trait `LogBroadcastOrm`.
//!
//! Objetivo general del módulo:
//! - Proveer el Log Store y el Broadcast Ledger durables con paridad 1:1
//!   respecto a `InMemoryLogOrm`.
//! - Cada operación es una transacción acotada; backfill y borrado por reorg
//!   corren en una transacción explícita `read_write`.
//! - Sin reintentos internos: los errores transitorios se devuelven como
//!   `TrackerError::Transient` y el listener decide.
//!
//! Sesión: cada conexión nueva del pool se configura con `SET TIME ZONE 'UTC'`
//! y, si está configurado, `statement_timeout`.

mod orm;
pub mod rows;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use log::{debug, warn};

use crate::config::DbConfig;
use crate::dbutil::{set_statement_timeout, set_timezone};
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use orm::PgLogOrm;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simularlo en tests sin acoplar a r2d2.
///
/// Contrato:
/// - Debe devolver una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Ajustes de sesión aplicados al abrir cada conexión del pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub statement_timeout_ms: Option<u64>,
}

impl CustomizeConnection<PgConnection, r2d2::Error> for SessionSettings {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), r2d2::Error> {
        set_timezone(conn).map_err(r2d2::Error::QueryError)?;
        if let Some(timeout_ms) = self.statement_timeout_ms {
            set_statement_timeout(conn, timeout_ms).map_err(r2d2::Error::QueryError)?;
        }
        Ok(())
    }
}

/// Construye un pool Postgres r2d2 a partir de URL con ajustes por defecto.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    build_pool_with_settings(database_url, min_size, max_size, SessionSettings::default())
}

/// Construye el pool y corre las migraciones pendientes.
///
/// - Si `min_size > max_size`, usa `min_size = max_size`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool_with_settings(database_url: &str,
                                min_size: u32,
                                max_size: u32,
                                settings: SessionSettings)
                                -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .connection_customizer(Box::new(settings))
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    debug!("pool ready min={final_min} max={validated_max} statement_timeout_ms={:?}",
           settings.statement_timeout_ms);
    Ok(pool)
}

pub fn build_pool_from_config(cfg: &DbConfig) -> Result<PgPool, PersistenceError> {
    build_pool_with_settings(&cfg.url,
                             cfg.min_connections,
                             cfg.max_connections,
                             SessionSettings { statement_timeout_ms: cfg.statement_timeout_ms })
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = DbConfig::from_env()?;
    build_pool_from_config(&cfg)
}
