use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioBuildError {
    #[error("think expects a non-negative duration (got {value}).")]
    NegativeThink { value: f64 },
    #[error("think range is reversed ({lo} > {hi}).")]
    ReversedThinkRange { lo: f64, hi: f64 },
    #[error("choose block has no options.")]
    EmptyChoose,
    #[error("choose block has zero total weight.")]
    ZeroTotalWeight,
}
