//! Transaction submission module with nonce allocation, resource markups and retry

mod gas;
mod nonce;
mod retry;
mod sender;

pub use gas::ResourcePolicy;
pub use nonce::SequenceAllocator;
pub use retry::RetryPolicy;
pub use sender::{FailurePolicy, SubmissionEngine};
