//! Logs de cadena tal como los entrega el Log Source.
//!
//! La identidad de un log es `(block_hash, log_index)`. Un reorg puede
//! reemplazar el contenido bajo la misma identidad; por eso todos los campos
//! restantes son mutables desde el punto de vista del store.
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Identidad única de un log dentro del store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogKey {
    pub block_hash: B256,
    pub log_index: u64,
}

impl LogKey {
    pub fn new(block_hash: B256, log_index: u64) -> Self {
        Self { block_hash, log_index }
    }
}

/// Evento emitido por un contrato.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub block_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub address: Address,
    /// El orden de los topics es significativo.
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Marcado por el Log Source cuando el bloque fue revertido.
    pub removed: bool,
}

impl LogRecord {
    pub fn key(&self) -> LogKey {
        LogKey::new(self.block_hash, self.log_index)
    }
}

/// Predicado de lectura para `fetch_logs`.
///
/// Todos los criterios son opcionales y se combinan con AND. El rango de
/// bloques es semiabierto: `from_block <= n < before_block`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: Option<u64>,
    pub before_block: Option<u64>,
    pub address: Option<Address>,
}

impl LogFilter {
    pub fn from_block(mut self, block_number: u64) -> Self {
        self.from_block = Some(block_number);
        self
    }

    pub fn before_block(mut self, block_number: u64) -> Self {
        self.before_block = Some(block_number);
        self
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn matches(&self, log: &LogRecord) -> bool {
        self.from_block.map_or(true, |from| log.block_number >= from)
            && self.before_block.map_or(true, |before| log.block_number < before)
            && self.address.map_or(true, |address| log.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(block_number: u64, address: Address) -> LogRecord {
        LogRecord { block_hash: B256::repeat_byte(block_number as u8),
                    block_number,
                    log_index: 0,
                    address,
                    topics: vec![],
                    data: Bytes::new(),
                    removed: false }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(LogFilter::default().matches(&log_at(0, Address::ZERO)));
    }

    #[test]
    fn block_range_is_half_open() {
        let filter = LogFilter::default().from_block(10).before_block(12);
        assert!(!filter.matches(&log_at(9, Address::ZERO)));
        assert!(filter.matches(&log_at(10, Address::ZERO)));
        assert!(filter.matches(&log_at(11, Address::ZERO)));
        assert!(!filter.matches(&log_at(12, Address::ZERO)));
    }

    #[test]
    fn address_must_match_exactly() {
        let emitter = Address::repeat_byte(0xaa);
        let filter = LogFilter::default().address(emitter);
        assert!(filter.matches(&log_at(1, emitter)));
        assert!(!filter.matches(&log_at(1, Address::repeat_byte(0xbb))));
    }
}
