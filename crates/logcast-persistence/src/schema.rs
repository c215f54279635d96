//! Esquema Diesel (escrito a mano a partir de `migrations/`). Reemplazable con `diesel print-schema`.

diesel::table! {
    eth_logs (block_hash, log_index) {
        block_hash -> Bytea,
        log_index -> BigInt,
        block_number -> BigInt,
        address -> Bytea,
        topics -> Array<Bytea>,
        data -> Bytea,
        removed -> Bool,
        order_received -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    log_broadcasts (id) {
        id -> BigInt,
        block_hash -> Bytea,
        block_number -> BigInt,
        log_index -> BigInt,
        job_id -> Nullable<Uuid>,
        job_id_v2 -> Nullable<Integer>,
        consumed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    eth_logs,
    log_broadcasts,
);
