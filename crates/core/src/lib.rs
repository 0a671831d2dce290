//! Domain records, sync model, and error taxonomy for the herdbook
//! offline-first data layer.

pub mod errors;
pub mod records;
pub mod sync;

pub use errors::{DatabaseError, Error, RemoteError, Result};
