use std::sync::Arc;

use crate::georeferencer::BatchPolicy;
use crate::pipes::PipeChain;

pub struct AppState {
    pub chain: Arc<PipeChain>,
    /// Preflight gates for single requests. Batch-only options are unused.
    pub policy: BatchPolicy,
}
