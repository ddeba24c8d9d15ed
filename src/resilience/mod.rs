pub mod retry;
pub mod timeout;

pub use retry::{retry_with_policy, RetryPolicy};
pub use timeout::{RequestScope, TimeoutExt};
