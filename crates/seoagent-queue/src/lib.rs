pub mod error;
pub mod publisher;
pub mod sigv4;
pub mod sqs;

pub use error::QueueError;
pub use publisher::{PublishReceipt, QueuePublisher};
pub use sqs::SqsPublisher;
