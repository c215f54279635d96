//! logcast-persistence
//!
//! Implementación Postgres (Diesel) del Log Store y el Broadcast Ledger
//! definidos en `logcast-core`, más utilidades de conexión y migraciones.
//!
//! Módulos:
//! - `pg`: `PgLogOrm`, pool r2d2 y ajustes de sesión.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env / entorno.
//! - `schema`: tablas Diesel (`eth_logs`, `log_broadcasts`).
//! - `dbutil`: helpers de sesión (zona horaria, statement_timeout).

pub mod config;
pub mod dbutil;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, build_pool_from_config, ConnectionProvider, PgLogOrm, PgPool, PoolProvider};
