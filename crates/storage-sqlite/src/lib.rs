//! SQLite persistence for the herdbook offline data layer: per-collection
//! record tables and the durable mutation outbox.

pub mod db;
pub mod errors;
pub mod local_store;
pub mod outbox;
pub(crate) mod schema;

pub use db::{create_pool, get_connection, run_migrations, DbPool, WriteHandle};
pub use local_store::{CollectionStore, LocalStore};
pub use outbox::OutboxRepository;
