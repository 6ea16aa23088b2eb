pub mod client;
pub mod retry;
pub mod types;

pub use client::{ApiClient, TaskEventStream};
pub use retry::RetryConfig;
pub use types::{CreateTaskRequest, CreateTaskResponse};
