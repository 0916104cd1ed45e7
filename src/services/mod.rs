pub mod extractor;
pub mod publisher;
pub mod readiness;
pub mod retry;

pub use extractor::Extractor;
pub use publisher::{PreparedUpload, Publisher, StorageBackend, StoredObject, WriteGrant};
pub use readiness::{NetworkIdle, ReadinessDetector, ReadinessReport, ReadinessSettings};
pub use retry::{ConstantDelay, DelayPolicy, ExponentialBackoff, RetryController};
