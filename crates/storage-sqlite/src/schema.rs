//! Diesel schema for the sync infrastructure table. The per-collection
//! record tables share one fixed layout and are addressed through
//! `Collection::table_name`, so they have no diesel DSL mapping.

diesel::table! {
    sync_queue (id) {
        id -> BigInt,
        collection -> Text,
        op -> Text,
        record_id -> Text,
        payload -> Text,
        enqueued_at -> BigInt,
        retries -> Integer,
    }
}
