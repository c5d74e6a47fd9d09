use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("stale handle: slot {index} has generation {current}, handle carries {generation}")]
    StaleHandle { index: u32, generation: u32, current: u32 },

    #[error("slot index {index} out of range (pool has {len} slots)")]
    InvalidIndex { index: u32, len: u32 },

    #[error("reference count underflow on slot {index}")]
    RefCountUnderflow { index: u32 },

    #[error("pool exhausted: all {capacity} slots are in use")]
    Exhausted { capacity: u32 },
}

pub type PoolResult<T> = Result<T, PoolError>;
