pub mod run_state;

pub use run_state::{PipelineState, RunCtx, RunOutcome};
