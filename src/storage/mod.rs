pub mod log_storage;
pub mod state_storage;

pub use log_storage::FileLog;
pub use state_storage::{DurableState, FileStateStore, StateStore};
