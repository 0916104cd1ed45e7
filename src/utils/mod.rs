pub mod logging;

pub use logging::{init, log_outcome, log_startup, truncate_text};
