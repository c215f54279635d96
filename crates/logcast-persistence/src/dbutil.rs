//! Utilidades de conexión.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::QueryResult;

pub fn is_postgres_url(url: &str) -> bool {
    url.to_lowercase().starts_with("postgres")
}

/// Fija la zona horaria de la sesión a UTC (created_at y demás timestamps).
pub fn set_timezone(conn: &mut PgConnection) -> QueryResult<()> {
    conn.batch_execute("SET TIME ZONE 'UTC'")
}

pub fn set_statement_timeout(conn: &mut PgConnection, timeout_ms: u64) -> QueryResult<()> {
    conn.batch_execute(&format!("SET statement_timeout = {timeout_ms}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_postgres_urls() {
        assert!(is_postgres_url("postgres://user@localhost/logcast"));
        assert!(is_postgres_url("POSTGRESQL://user@localhost/logcast"));
        assert!(!is_postgres_url("sqlite://logcast.db"));
        assert!(!is_postgres_url(""));
    }
}
