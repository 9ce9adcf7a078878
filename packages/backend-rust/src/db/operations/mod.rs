pub mod memory_states;

pub use memory_states::{ReviewRecord, ReviewStats, StoreError, MAX_BATCH_SIZE};
