//! Transaction mempool for the Aegen node.
//!
//! Admission enforces well-formedness, contiguous per-sender nonces and
//! balance sufficiency; drain hands the producer transactions in an order
//! that never puts a sender's nonces out of sequence. The pool is owned by
//! the node state machine, which serializes admission against drain.

mod state;

pub use state::{MempoolConfig, MempoolState};
