use thiserror::Error;

/// Every reported error is treated as a bug to surface, not retried — see
/// the error handling design's "no retries" stance.
#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("protocol violation from worker {worker}: {detail}")]
    Protocol { worker: usize, detail: String },

    #[error("game capability violation in worker {worker}: {source}")]
    GameCapability {
        worker: usize,
        #[source]
        source: az_core::GameError,
    },

    #[error("evaluator failure: {0}")]
    Evaluator(#[from] az_net::NetError),

    #[error("worker {0} did not exit within the shutdown timeout")]
    WorkerShutdownTimeout(usize),
}
