use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("evaluator produced a non-finite value ({0})")]
    NonFinite(f32),
    #[error("evaluator batch shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}
