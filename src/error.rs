use crate::page_layout::{MAX_KEY_SIZE, MAX_VAL_SIZE};
use crate::pager::PagePtr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("key is {0} bytes, the maximum is {max}", max = MAX_KEY_SIZE)]
    KeyTooLong(usize),
    #[error("value is {0} bytes, the maximum is {max}", max = MAX_VAL_SIZE)]
    ValueTooLong(usize),
    #[error("the empty key is reserved")]
    EmptyKey,
    /// A node index past `num_keys`. Always an engine bug.
    #[error("index {index} out of range for a node with {num_keys} keys")]
    OutOfRange { index: usize, num_keys: u16 },
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("bad page pointer {0}")]
    BadPointer(PagePtr),
    #[error("incomplete write: wrote {written} bytes instead of {expected}")]
    ShortWrite { written: usize, expected: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
