//! Carga de configuración de conexión desde variables de entorno.
//! Usa convención `DATABASE_URL` y parámetros opcionales de pool/sesión.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::dbutil::is_postgres_url;
use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// `statement_timeout` de sesión; una transacción que lo excede se
    /// revierte entera.
    pub statement_timeout_ms: Option<u64>,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL not set".into()))?;
        if !is_postgres_url(&url) {
            return Err(PersistenceError::Config("DATABASE_URL must be a postgres:// URL".into()));
        }
        let min_connections = parse_var("DATABASE_MIN_CONNECTIONS").unwrap_or(2);
        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(16);
        let statement_timeout_ms = parse_var("DATABASE_STATEMENT_TIMEOUT_MS");
        Ok(Self { url, min_connections, max_connections, statement_timeout_ms })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
