//! State store: schema, persisted models, lock-contention retry

pub mod init;
pub mod models;
pub mod retry;

pub use init::*;
pub use models::*;
pub use retry::{is_lock_error, retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
