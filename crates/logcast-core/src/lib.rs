//! logcast-core: tracker de consumo de broadcasts de logs de cadena.
//!
//! - `model`: logs, broadcasts e identidad de listeners (legacy UUID / v2 entero).
//! - `orm`: trait `LogBroadcastOrm` (Log Store + Broadcast Ledger) y su
//!   implementación en memoria.
//! - `broadcaster`: coordinador de ingesta y suscripciones sobre cualquier ORM.
//! - `errors`: `TrackerError`.
pub mod broadcaster;
pub mod errors;
pub mod model;
pub mod orm;

pub use broadcaster::LogBroadcaster;
pub use errors::{TrackerError, TrackerResult};
pub use model::{BroadcastRecord, LegacyJobId, ListenerId, LogFilter, LogKey, LogRecord};
pub use orm::{InMemoryLogOrm, LogBroadcastOrm};
