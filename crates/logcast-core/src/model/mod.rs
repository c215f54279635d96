//! Modelo de dominio: logs, broadcasts e identidad de listeners.

mod broadcast;
mod listener;
mod record;

pub use broadcast::BroadcastRecord;
pub use listener::{LegacyJobId, ListenerId};
pub use record::{LogFilter, LogKey, LogRecord};
